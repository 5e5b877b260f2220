// src/ingest/providers/synthetic.rs
//! Deterministic-shape, time-relative demo data. Also the fallback for failed feeds.

use std::f64::consts::PI;

use async_trait::async_trait;
use chrono::{DateTime, Duration, DurationRound, Utc};

use crate::error::IngestError;
use crate::ingest::types::{ForecastProvider, IngestionContext, WarningProvider};
use crate::model::{ForecastPoint, HazardWarning, SeverityLevel};

pub const SOURCE_SCENARIO: &str = "synthetic";
pub const SOURCE_FORECAST: &str = "synthetic-forecast";

const SCENARIO_DETAIL_URL: &str = "https://www.nmc.cn/publish/weather-bulletin/index.htm";
const REGION_DETAIL_URL: &str = "https://www.nmc.cn/publish/weatherperday/index.htm";

const FORECAST_DAYS: i64 = 7;
const FORECAST_STEP_HOURS: i64 = 3;

struct Scenario {
    title: &'static str,
    level: SeverityLevel,
    hazard: &'static str,
    region: &'static str,
    minutes_ago: i64,
    duration_hours: i64,
    summary: &'static str,
}

const SCENARIOS: [Scenario; 10] = [
    Scenario {
        title: "台风红色预警（演示）",
        level: SeverityLevel::Red,
        hazard: "台风",
        region: "福建",
        minutes_ago: 15,
        duration_hours: 10,
        summary: "沿海风力可达13级以上，注意海上作业安全。",
    },
    Scenario {
        title: "暴雨橙色预警（演示）",
        level: SeverityLevel::Orange,
        hazard: "暴雨",
        region: "广东",
        minutes_ago: 25,
        duration_hours: 12,
        summary: "部分地区小时雨强较大，低洼路段有内涝风险。",
    },
    Scenario {
        title: "高温红色预警（演示）",
        level: SeverityLevel::Red,
        hazard: "高温",
        region: "新疆",
        minutes_ago: 40,
        duration_hours: 18,
        summary: "白天气温可超过40°C，建议减少午后户外活动。",
    },
    Scenario {
        title: "强对流黄色预警（演示）",
        level: SeverityLevel::Yellow,
        hazard: "强对流",
        region: "湖北",
        minutes_ago: 35,
        duration_hours: 9,
        summary: "局地短时强降水、雷暴大风和冰雹概率升高。",
    },
    Scenario {
        title: "雷电黄色预警（演示）",
        level: SeverityLevel::Yellow,
        hazard: "雷电",
        region: "江苏",
        minutes_ago: 30,
        duration_hours: 8,
        summary: "午后到夜间雷电活动频繁，注意临时搭建物安全。",
    },
    Scenario {
        title: "沙尘蓝色预警（演示）",
        level: SeverityLevel::Blue,
        hazard: "沙尘",
        region: "内蒙古",
        minutes_ago: 45,
        duration_hours: 14,
        summary: "局地有扬沙或浮尘天气，能见度下降。",
    },
    Scenario {
        title: "寒潮蓝色预警（演示）",
        level: SeverityLevel::Blue,
        hazard: "寒潮",
        region: "黑龙江",
        minutes_ago: 55,
        duration_hours: 16,
        summary: "未来48小时降温显著，请提前做好保暖防冻。",
    },
    Scenario {
        title: "大风橙色预警（演示）",
        level: SeverityLevel::Orange,
        hazard: "大风",
        region: "北京",
        minutes_ago: 20,
        duration_hours: 7,
        summary: "阵风较强，部分高空设施有坠落风险。",
    },
    Scenario {
        title: "暴雪黄色预警（演示）",
        level: SeverityLevel::Yellow,
        hazard: "暴雪",
        region: "青海",
        minutes_ago: 65,
        duration_hours: 15,
        summary: "山区降雪增强，道路湿滑结冰风险提高。",
    },
    Scenario {
        title: "干旱蓝色预警（演示）",
        level: SeverityLevel::Blue,
        hazard: "干旱",
        region: "云南",
        minutes_ago: 75,
        duration_hours: 20,
        summary: "部分区域降水持续偏少，农业用水压力上升。",
    },
];

#[derive(Clone, Default)]
pub struct SyntheticProvider {
    fixed: Option<DateTime<Utc>>,
}

impl SyntheticProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Anchor every generated record to `now` instead of the wall clock.
    pub fn at(now: DateTime<Utc>) -> Self {
        Self { fixed: Some(now) }
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.fixed.unwrap_or_else(Utc::now)
    }

    pub fn warnings_at(ctx: &IngestionContext, now: DateTime<Utc>) -> Vec<HazardWarning> {
        let mut out: Vec<HazardWarning> = SCENARIOS
            .iter()
            .map(|s| HazardWarning {
                source: SOURCE_SCENARIO.to_string(),
                title: s.title.to_string(),
                level: s.level,
                hazard_kind: s.hazard.to_string(),
                region: s.region.to_string(),
                issued_at: now - Duration::minutes(s.minutes_ago),
                expires_at: Some(now + Duration::hours(s.duration_hours)),
                detail_url: SCENARIO_DETAIL_URL.to_string(),
                summary: s.summary.to_string(),
                confidence: 1.0,
            })
            .collect();

        // Always give the requested region something to highlight.
        out.push(HazardWarning {
            source: SOURCE_SCENARIO.to_string(),
            title: format!("{}地区综合风险提示（演示）", ctx.region),
            level: SeverityLevel::Yellow,
            hazard_kind: "综合风险".to_string(),
            region: ctx.region.clone(),
            issued_at: now - Duration::minutes(10),
            expires_at: Some(now + Duration::hours(6)),
            detail_url: REGION_DETAIL_URL.to_string(),
            summary: "该提示用于演示当前省份高亮与预警联动效果。".to_string(),
            confidence: 0.95,
        });
        out
    }

    pub fn forecast_at(ctx: &IngestionContext, now: DateTime<Utc>) -> Vec<ForecastPoint> {
        let start = now.duration_trunc(Duration::hours(1)).unwrap_or(now);
        (0..24 * FORECAST_DAYS)
            .step_by(FORECAST_STEP_HOURS as usize)
            .map(|h| {
                let phase = (h % 24) as f64 / 24.0;
                let temperature = 22.0 + 8.0 * (2.0 * PI * phase).sin();
                let humidity = 65.0 + 20.0 * (2.0 * PI * phase).cos();
                ForecastPoint::new(
                    ctx.lat,
                    ctx.lon,
                    ctx.label.clone(),
                    ctx.region.clone(),
                    start + Duration::hours(h),
                    round1(temperature),
                    round1(humidity).clamp(15.0, 100.0),
                    SOURCE_FORECAST,
                )
            })
            .collect()
    }
}

fn round1(v: f64) -> f64 {
    (v * 10.0).round() / 10.0
}

#[async_trait]
impl WarningProvider for SyntheticProvider {
    async fn fetch_warnings(
        &self,
        ctx: &IngestionContext,
    ) -> Result<Vec<HazardWarning>, IngestError> {
        Ok(Self::warnings_at(ctx, self.now()))
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

#[async_trait]
impl ForecastProvider for SyntheticProvider {
    async fn fetch_forecast(
        &self,
        ctx: &IngestionContext,
    ) -> Result<Vec<ForecastPoint>, IngestError> {
        Ok(Self::forecast_at(ctx, self.now()))
    }

    fn name(&self) -> &'static str {
        "synthetic"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forecast_starts_on_the_hour_in_three_hour_steps() {
        let ctx = IngestionContext::new(39.9042, 116.4074, "北京", "北京");
        let now = DateTime::parse_from_rfc3339("2024-07-01T08:41:13Z")
            .unwrap()
            .with_timezone(&Utc);
        let pts = SyntheticProvider::forecast_at(&ctx, now);
        assert_eq!(pts.len(), 56);
        assert_eq!(pts[0].forecast_at.to_rfc3339(), "2024-07-01T08:00:00+00:00");
        assert_eq!(pts[1].forecast_at - pts[0].forecast_at, Duration::hours(3));
        // phase 0: sin = 0, cos = 1
        assert_eq!(pts[0].temperature_c, 22.0);
        assert_eq!(pts[0].humidity_pct, 85.0);
    }
}
