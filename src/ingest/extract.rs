// src/ingest/extract.rs
//! Bulletin HTML → candidate hazard signals. Pure functions, no I/O.

use once_cell::sync::OnceCell;
use regex::Regex;

use crate::model::SeverityLevel;

pub const DEFAULT_TITLE: &str = "天气公告";
pub const DEFAULT_HAZARD: &str = "综合风险";
pub const SUMMARY_MAX_CHARS: usize = 120;
const ELLIPSIS: &str = "...";

/// Scan order is the tie-break: the first label found wins.
const LEVEL_PATTERNS: [(&str, SeverityLevel); 4] = [
    ("红色", SeverityLevel::Red),
    ("橙色", SeverityLevel::Orange),
    ("黄色", SeverityLevel::Yellow),
    ("蓝色", SeverityLevel::Blue),
];

const HAZARD_KEYWORDS: [&str; 10] = [
    "暴雨", "暴雪", "高温", "寒潮", "雷电", "大风", "沙尘", "台风", "强对流", "冰雹",
];

/// Province-level region names recognized in bulletin text.
pub const KNOWN_REGIONS: [&str; 34] = [
    "安徽", "北京", "重庆", "福建", "甘肃", "广东", "广西", "贵州", "海南", "河北", "黑龙江", "河南",
    "湖北", "湖南", "江苏", "江西", "吉林", "辽宁", "内蒙古", "宁夏", "青海", "山东", "上海", "山西",
    "陕西", "四川", "天津", "西藏", "新疆", "云南", "浙江", "香港", "澳门", "台湾",
];

fn re_title() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"(?is)<title[^>]*>(.*?)</title>").unwrap())
}

fn re_script_style() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| {
        Regex::new(r"(?is)<script[^>]*>.*?</script>|<style[^>]*>.*?</style>").unwrap()
    })
}

fn re_tags() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"<[^>]+>").unwrap())
}

fn re_ws() -> &'static Regex {
    static RE: OnceCell<Regex> = OnceCell::new();
    RE.get_or_init(|| Regex::new(r"\s+").unwrap())
}

/// Page `<title>`, entity-decoded and trimmed.
pub fn extract_title(html: &str) -> Option<String> {
    let caps = re_title().captures(html)?;
    let raw = caps.get(1)?.as_str();
    let title = html_escape::decode_html_entities(raw).trim().to_string();
    (!title.is_empty()).then_some(title)
}

/// Drop script/style blocks and tags, decode entities, collapse whitespace.
pub fn to_plain_text(html: &str) -> String {
    let no_blocks = re_script_style().replace_all(html, " ");
    let no_tags = re_tags().replace_all(&no_blocks, " ");
    let decoded = html_escape::decode_html_entities(&no_tags);
    re_ws().replace_all(&decoded, " ").trim().to_string()
}

pub fn detect_level(text: &str) -> SeverityLevel {
    LEVEL_PATTERNS
        .iter()
        .find(|(label, _)| text.contains(label))
        .map(|(_, level)| *level)
        .unwrap_or(SeverityLevel::Blue)
}

pub fn detect_hazard(text: &str) -> &'static str {
    HAZARD_KEYWORDS
        .iter()
        .copied()
        .find(|kw| text.contains(kw))
        .unwrap_or(DEFAULT_HAZARD)
}

/// Every known region named verbatim in `text`, in catalogue order.
pub fn detect_regions(text: &str) -> Vec<String> {
    KNOWN_REGIONS
        .iter()
        .filter(|name| text.contains(*name))
        .map(|name| name.to_string())
        .collect()
}

/// Texts over 120 characters become their first 120 characters plus "...".
pub fn compact_summary(text: &str) -> String {
    if text.chars().count() <= SUMMARY_MAX_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(SUMMARY_MAX_CHARS).collect();
    out.push_str(ELLIPSIS);
    out
}

/// Heuristic reading of one bulletin page.
#[derive(Debug, Clone, PartialEq)]
pub struct BulletinExtract {
    pub title: String,
    pub plain_text: String,
    pub level: SeverityLevel,
    pub hazard_kind: String,
    pub regions: Vec<String>,
    pub summary: String,
}

pub fn extract_bulletin(html: &str, fallback_region: &str) -> BulletinExtract {
    let title = extract_title(html).unwrap_or_else(|| DEFAULT_TITLE.to_string());
    let plain_text = to_plain_text(html);
    let mut regions = detect_regions(&plain_text);
    if regions.is_empty() {
        regions.push(fallback_region.to_string());
    }
    BulletinExtract {
        level: detect_level(&plain_text),
        hazard_kind: detect_hazard(&plain_text).to_string(),
        summary: compact_summary(&plain_text),
        title,
        regions,
        plain_text,
    }
}
