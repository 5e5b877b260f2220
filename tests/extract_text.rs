// tests/extract_text.rs
use hazard_ingest::ingest::extract::{
    compact_summary, detect_hazard, detect_level, detect_regions, extract_bulletin, to_plain_text,
    DEFAULT_HAZARD, DEFAULT_TITLE,
};
use hazard_ingest::model::SeverityLevel;

const PAGE: &str = r#"
<html>
  <head>
    <title> 中央气象台发布暴雨橙色预警 &amp; 强对流天气预报 </title>
    <style>.x { color: red; }</style>
    <script>var level = "红色";</script>
  </head>
  <body>
    <p>预计6月1日08时至2日08时，广东、广西南部、福建东南部等地有大到暴雨。</p>
    <p>局地伴有短时强降水和雷暴大风，请注意防范黄色以上风险。</p>
  </body>
</html>
"#;

#[test]
fn bulletin_page_yields_title_level_hazard_and_regions() {
    let ex = extract_bulletin(PAGE, "北京");
    assert_eq!(ex.title, "中央气象台发布暴雨橙色预警 & 强对流天气预报");
    // "红色" lives in a script block and must not count
    assert_eq!(ex.level, SeverityLevel::Orange);
    assert_eq!(ex.hazard_kind, "暴雨");
    assert_eq!(ex.regions, vec!["福建", "广东", "广西"]);
    assert!(!ex.plain_text.contains('<'));
    assert!(!ex.plain_text.contains("color"));
}

#[test]
fn page_without_regions_falls_back_to_context_region() {
    let ex = extract_bulletin("<p>全国大部地区天气晴好。</p>", "北京");
    assert_eq!(ex.title, DEFAULT_TITLE);
    assert_eq!(ex.regions, vec!["北京"]);
    assert_eq!(ex.level, SeverityLevel::Blue);
    assert_eq!(ex.hazard_kind, DEFAULT_HAZARD);
}

#[test]
fn level_scan_order_breaks_ties() {
    assert_eq!(detect_level("蓝色转黄色再升红色"), SeverityLevel::Red);
    assert_eq!(detect_level("黄色和蓝色"), SeverityLevel::Yellow);
    assert_eq!(detect_level("无等级"), SeverityLevel::Blue);
}

#[test]
fn hazard_uses_first_keyword_in_catalogue_order() {
    assert_eq!(detect_hazard("大风伴随暴雨"), "暴雨");
    assert_eq!(detect_hazard("冰雹"), "冰雹");
    assert_eq!(detect_hazard("雾"), DEFAULT_HAZARD);
}

#[test]
fn regions_are_reported_once_in_catalogue_order() {
    assert_eq!(
        detect_regions("上海、北京、上海、内蒙古"),
        vec!["北京", "内蒙古", "上海"]
    );
    assert!(detect_regions("no provinces here").is_empty());
}

#[test]
fn summary_is_capped_at_120_chars_plus_ellipsis() {
    let short = "短文本";
    assert_eq!(compact_summary(short), short);

    let exact: String = "风".repeat(120);
    assert_eq!(compact_summary(&exact), exact);

    let long: String = "雨".repeat(121);
    let out = compact_summary(&long);
    assert_eq!(out.chars().count(), 123);
    assert!(out.ends_with("..."));
    assert!(out.starts_with(&"雨".repeat(120)));
}

#[test]
fn plain_text_collapses_whitespace_and_decodes_entities() {
    assert_eq!(
        to_plain_text("<div>a&nbsp;&nbsp;b\n\n<span>c</span></div>"),
        "a b c"
    );
}
