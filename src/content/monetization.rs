//! Monetization Engine
//!
//! 記事タイトルをスポンサー分類（カテゴリ・専攻）に照合し、構造上の位置に
//! 提携プログラム一覧のショートコードを挿入する。

use crate::html;
use crate::types::{MonetizationSlot, SlotPosition};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use tracing::{debug, warn};

/// 専攻（カテゴリ内の細分類）
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Concentration {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
    /// 提携プログラム数
    #[serde(default)]
    pub sponsored_programs: u32,
}

/// スポンサーカテゴリ
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SponsorshipCategory {
    pub id: String,
    pub name: String,
    pub keywords: Vec<String>,
    #[serde(default)]
    pub sponsored_programs: u32,
    #[serde(default)]
    pub concentrations: Vec<Concentration>,
}

/// スポンサー分類
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SponsorshipTaxonomy {
    pub categories: Vec<SponsorshipCategory>,
}

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn concentration(id: &str, name: &str, keywords: &[&str], programs: u32) -> Concentration {
    Concentration {
        id: id.to_string(),
        name: name.to_string(),
        keywords: strings(keywords),
        sponsored_programs: programs,
    }
}

impl Default for SponsorshipTaxonomy {
    fn default() -> Self {
        Self {
            categories: vec![
                SponsorshipCategory {
                    id: "business".to_string(),
                    name: "Business".to_string(),
                    keywords: strings(&["business", "mba", "management", "accounting", "finance", "marketing"]),
                    sponsored_programs: 12,
                    concentrations: vec![
                        concentration("mba", "MBA", &["mba", "business administration"], 8),
                        concentration("accounting", "Accounting", &["accounting", "cpa"], 3),
                        concentration("finance", "Finance", &["finance"], 2),
                    ],
                },
                SponsorshipCategory {
                    id: "nursing".to_string(),
                    name: "Nursing & Healthcare".to_string(),
                    keywords: strings(&["nursing", "nurse", "rn", "bsn", "msn", "dnp", "healthcare"]),
                    sponsored_programs: 9,
                    concentrations: vec![
                        concentration("rn-to-bsn", "RN to BSN", &["rn to bsn", "bsn"], 4),
                        concentration("nurse-practitioner", "Nurse Practitioner", &["nurse practitioner", "fnp", "np"], 3),
                    ],
                },
                SponsorshipCategory {
                    id: "education".to_string(),
                    name: "Education".to_string(),
                    keywords: strings(&["education", "teaching", "teacher", "m.ed", "edd"]),
                    sponsored_programs: 5,
                    concentrations: vec![concentration(
                        "curriculum",
                        "Curriculum & Instruction",
                        &["curriculum", "instruction"],
                        2,
                    )],
                },
                SponsorshipCategory {
                    id: "technology".to_string(),
                    name: "Computer Science & IT".to_string(),
                    keywords: strings(&["computer science", "cybersecurity", "data science", "information technology", "software"]),
                    sponsored_programs: 7,
                    concentrations: vec![
                        concentration("cybersecurity", "Cybersecurity", &["cybersecurity", "cyber security"], 3),
                        concentration("data-science", "Data Science", &["data science", "analytics"], 2),
                    ],
                },
                SponsorshipCategory {
                    id: "psychology".to_string(),
                    name: "Psychology & Counseling".to_string(),
                    keywords: strings(&["psychology", "counseling", "social work"]),
                    sponsored_programs: 4,
                    concentrations: Vec::new(),
                },
                SponsorshipCategory {
                    id: "criminal-justice".to_string(),
                    name: "Criminal Justice".to_string(),
                    keywords: strings(&["criminal justice", "criminology", "law enforcement"]),
                    sponsored_programs: 3,
                    concentrations: Vec::new(),
                },
            ],
        }
    }
}

/// 収益化設定
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonetizationConfig {
    /// 1スロットあたりのプログラム数
    pub programs_per_slot: u32,
    /// 挿入する位置
    pub positions: Vec<SlotPosition>,
    pub taxonomy: SponsorshipTaxonomy,
}

impl Default for MonetizationConfig {
    fn default() -> Self {
        Self {
            programs_per_slot: 3,
            positions: vec![
                SlotPosition::AfterIntro,
                SlotPosition::MidContent,
                SlotPosition::PreConclusion,
            ],
            taxonomy: SponsorshipTaxonomy::default(),
        }
    }
}

/// カテゴリ照合結果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryMatch {
    pub category_id: String,
    pub concentration_id: Option<String>,
    /// 0.0-1.0
    pub confidence: f64,
    pub degree_level: Option<String>,
}

/// 収益化の入力
#[derive(Debug, Clone)]
pub struct MonetizationContext<'a> {
    pub title: &'a str,
    pub degree_level: Option<&'a str>,
    pub content: &'a str,
}

/// 収益化プラン
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct MonetizationPlan {
    pub category: Option<CategoryMatch>,
    pub slots: Vec<MonetizationSlot>,
    pub total_programs_selected: u32,
}

/// 収益化エンジン
#[derive(Debug, Clone, Default)]
pub struct MonetizationEngine {
    config: MonetizationConfig,
}

impl MonetizationEngine {
    pub fn new(config: MonetizationConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &MonetizationConfig {
        &self.config
    }

    /// タイトルをスポンサーカテゴリに照合
    pub fn match_topic_to_category(
        &self,
        title: &str,
        degree_level: Option<&str>,
    ) -> Option<CategoryMatch> {
        let lowered = title.to_lowercase();

        let (category, hits) = self
            .config
            .taxonomy
            .categories
            .iter()
            .map(|c| (c, keyword_hits(&lowered, &c.keywords)))
            .filter(|(_, hits)| *hits > 0)
            .fold(None::<(&SponsorshipCategory, usize)>, |best, current| {
                match best {
                    Some(b) if b.1 >= current.1 => Some(b),
                    _ => Some(current),
                }
            })?;

        let concentration = category
            .concentrations
            .iter()
            .map(|c| (c, keyword_hits(&lowered, &c.keywords)))
            .filter(|(_, hits)| *hits > 0)
            .fold(None::<(&Concentration, usize)>, |best, current| match best {
                Some(b) if b.1 >= current.1 => Some(b),
                _ => Some(current),
            })
            .map(|(c, _)| c);

        let mut confidence = 0.4 + 0.2 * hits as f64;
        if concentration.is_some() {
            confidence += 0.2;
        }

        Some(CategoryMatch {
            category_id: category.id.clone(),
            concentration_id: concentration.map(|c| c.id.clone()),
            confidence: confidence.min(1.0),
            degree_level: degree_level
                .map(|l| l.to_lowercase())
                .or_else(|| infer_degree_level(title)),
        })
    }

    /// スロット構成を決める
    pub fn generate_monetization(&self, context: &MonetizationContext<'_>) -> MonetizationPlan {
        let Some(category_match) = self.match_topic_to_category(context.title, context.degree_level)
        else {
            warn!(
                "No sponsorship category matches \"{}\", skipping monetization",
                context.title
            );
            return MonetizationPlan::default();
        };

        let mut available = self.sponsored_programs(&category_match);
        let per_slot = self.config.programs_per_slot.max(1);
        let locations = slot_locations(context.content);

        let mut slots = Vec::new();
        let mut seen = HashSet::new();
        for position in &self.config.positions {
            if !seen.insert(*position) || !locations.iter().any(|(p, _)| p == position) {
                continue;
            }
            let (program_count, sponsored) = if available > 0 {
                let count = per_slot.min(available);
                available -= count;
                (count, true)
            } else {
                (per_slot, false)
            };
            slots.push(MonetizationSlot {
                position: *position,
                shortcode: shortcode(&category_match, *position, program_count, sponsored),
                program_count,
                sponsored,
            });
        }

        let total_programs_selected = slots.iter().map(|s| s.program_count).sum();
        debug!(
            "Monetization plan for {}: {} slot(s), {} program(s)",
            category_match.category_id,
            slots.len(),
            total_programs_selected
        );

        MonetizationPlan {
            category: Some(category_match),
            slots,
            total_programs_selected,
        }
    }

    fn sponsored_programs(&self, category_match: &CategoryMatch) -> u32 {
        let Some(category) = self
            .config
            .taxonomy
            .categories
            .iter()
            .find(|c| c.id == category_match.category_id)
        else {
            return 0;
        };
        category_match
            .concentration_id
            .as_ref()
            .and_then(|id| category.concentrations.iter().find(|c| &c.id == id))
            .map(|c| c.sponsored_programs)
            .unwrap_or(category.sponsored_programs)
    }
}

/// タイトルから学位レベルを推定
pub fn infer_degree_level(title: &str) -> Option<String> {
    let lowered = format!(" {} ", title.to_lowercase());
    let levels: [(&str, &[&str]); 5] = [
        ("doctorate", &["phd", "ph.d", "doctorate", "doctoral", "dnp", "edd", "ed.d"]),
        ("masters", &["master", "mba", "msn", "m.ed", "mpa", "mph"]),
        ("bachelors", &["bachelor", "bsn", "undergraduate"]),
        ("associate", &["associate degree", "associate's", "associates"]),
        ("certificate", &["certificate", "certification"]),
    ];
    levels
        .iter()
        .find(|(_, markers)| markers.iter().any(|m| contains_word(&lowered, m)))
        .map(|(level, _)| level.to_string())
}

fn keyword_hits(lowered_title: &str, keywords: &[String]) -> usize {
    keywords
        .iter()
        .filter(|k| contains_word(lowered_title, &k.to_lowercase()))
        .count()
}

/// 語境界つきの部分一致（"mba" は "mbas" にも一致させる）
fn contains_word(haystack: &str, needle: &str) -> bool {
    haystack.match_indices(needle).any(|(start, _)| {
        let before = haystack[..start].chars().next_back();
        let after = haystack[start + needle.len()..].chars().next();
        !before.is_some_and(char::is_alphanumeric)
            && !after.is_some_and(|c| c.is_alphanumeric() && c != 's')
    })
}

fn shortcode(
    category_match: &CategoryMatch,
    position: SlotPosition,
    count: u32,
    sponsored: bool,
) -> String {
    let mut code = format!("[sponsored_programs category=\"{}\"", category_match.category_id);
    if let Some(concentration) = &category_match.concentration_id {
        code.push_str(&format!(" concentration=\"{}\"", concentration));
    }
    if let Some(level) = &category_match.degree_level {
        code.push_str(&format!(" level=\"{}\"", level));
    }
    code.push_str(&format!(
        " count=\"{}\" position=\"{}\" sponsored=\"{}\"]",
        count,
        position.as_str(),
        sponsored
    ));
    code
}

/// 各スロット位置の挿入オフセット
///
/// - after_intro: 最初のH2より前にある最初の段落の直後
/// - mid_content: 文書中央に最も近いH2の直前（先頭・末尾のH2を除く、H2が3つ以上）
/// - pre_conclusion: 最後のH2の直前（H2が2つ以上）
pub fn slot_locations(content: &str) -> Vec<(SlotPosition, usize)> {
    let h2s: Vec<html::Heading> = html::extract_headings(content)
        .into_iter()
        .filter(|h| h.level == 2)
        .collect();
    let mut locations = Vec::new();

    let intro_end = h2s.first().map(|h| h.start).unwrap_or(content.len());
    if let Some(close) = content[..intro_end].to_ascii_lowercase().find("</p>") {
        locations.push((SlotPosition::AfterIntro, close + "</p>".len()));
    }

    let last = h2s.last().map(|h| h.start);
    if h2s.len() >= 3 {
        let middle = content.len() / 2;
        if let Some(heading) = h2s[1..h2s.len() - 1]
            .iter()
            .min_by_key(|h| h.start.abs_diff(middle))
        {
            if Some(heading.start) != last {
                locations.push((SlotPosition::MidContent, heading.start));
            }
        }
    }

    if h2s.len() >= 2 {
        if let Some(start) = last {
            locations.push((SlotPosition::PreConclusion, start));
        }
    }

    locations
}

/// スロットのマークアップを本文に挿入
///
/// 既に同じ位置のスロットがある場合は挿入しない。
pub fn insert_slots(content: &str, slots: &[MonetizationSlot]) -> String {
    let locations = slot_locations(content);
    let mut inserts: Vec<(usize, String)> = Vec::new();
    let mut used_offsets = HashSet::new();

    for slot in slots {
        let marker = format!("data-position=\"{}\"", slot.position.as_str());
        if content.contains(&marker) {
            debug!("Slot {} already present", slot.position.as_str());
            continue;
        }
        let Some((_, offset)) = locations.iter().find(|(p, _)| *p == slot.position) else {
            continue;
        };
        if !used_offsets.insert(*offset) {
            continue;
        }
        inserts.push((
            *offset,
            format!(
                "<div class=\"monetization-slot\" {}>{}</div>",
                marker, slot.shortcode
            ),
        ));
    }

    // 後ろから挿入してオフセットを保つ
    inserts.sort_by(|a, b| b.0.cmp(&a.0));
    let mut out = content.to_string();
    for (offset, markup) in inserts {
        out.insert_str(offset, &markup);
    }
    out
}
