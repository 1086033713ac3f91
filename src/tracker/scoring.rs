use serde::{Deserialize, Serialize};

use crate::config::{Config, KneeForwardMode, ScoringConfig};
use crate::tracker::geometry::{in_range, try_angle_from_vertical, try_interior_angle};
use crate::tracker::side::SideJoints;

/// フォーム修正のためのコーチングキュー
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CoachingCue {
    #[serde(rename = "GO DEEPER")]
    GoDeeper,
    #[serde(rename = "LESS DEPTH")]
    LessDepth,
    #[serde(rename = "KNEES BACK")]
    KneesBack,
    #[serde(rename = "CHEST UP")]
    ChestUp,
    #[serde(rename = "REPOSITION")]
    Reposition,
}

impl CoachingCue {
    pub fn as_str(&self) -> &'static str {
        match self {
            CoachingCue::GoDeeper => "GO DEEPER",
            CoachingCue::LessDepth => "LESS DEPTH",
            CoachingCue::KneesBack => "KNEES BACK",
            CoachingCue::ChestUp => "CHEST UP",
            CoachingCue::Reposition => "REPOSITION",
        }
    }
}

impl std::fmt::Display for CoachingCue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// しゃがみ位置で測る3指標。None は計算不能（縮退した関節配置）
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct FormMetrics {
    /// 腰-膝-足首の内角（度）
    pub knee_angle: Option<f32>,
    /// 膝の前方移動（脛の長さに対する %）
    pub knee_forward_percent: Option<f32>,
    /// 膝と足首の水平距離
    pub knee_forward_pixels: Option<f32>,
    /// 肩→腰の鉛直からの角度（度）
    pub back_angle: Option<f32>,
}

impl FormMetrics {
    pub fn measure(joints: &SideJoints) -> Self {
        let hip = joints.hip.position;
        let knee = joints.knee.position;
        let ankle = joints.ankle.position;

        let knee_forward_pixels = (knee.x - ankle.x).abs();
        let shin = (ankle.y - knee.y).abs();
        let knee_forward_percent = (shin > 0.0).then(|| knee_forward_pixels / shin * 100.0);

        // 肩を腰で代用した場合は背中の角度を測れない
        let back_angle = if joints.shoulder_substituted {
            None
        } else {
            try_angle_from_vertical(joints.shoulder.position, hip)
        };

        Self {
            knee_angle: try_interior_angle(hip, knee, ankle),
            knee_forward_percent,
            knee_forward_pixels: Some(knee_forward_pixels),
            back_angle,
        }
    }
}

/// 指標ごとの減点
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Deductions {
    pub knee_angle: f32,
    pub knee_forward: f32,
    pub back_angle: f32,
}

impl Deductions {
    pub fn total(&self) -> f32 {
        self.knee_angle + self.knee_forward + self.back_angle
    }
}

/// 1フレームの採点結果
#[derive(Debug, Clone, PartialEq)]
pub struct FormScore {
    /// 0〜100
    pub quality: u32,
    pub metrics: FormMetrics,
    pub deductions: Deductions,
    pub cues: Vec<CoachingCue>,
    pub breakdown: String,
}

/// しゃがみ位置でのフォーム採点
///
/// 100点から指標ごとの減点を引く。減点は指標ごとに上限があり、
/// 合計は 0〜100 にクランプする。
pub struct FormScorer {
    config: ScoringConfig,
}

impl FormScorer {
    pub fn new(config: &ScoringConfig) -> Self {
        Self {
            config: config.clone(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.scoring)
    }

    pub fn score(&self, joints: &SideJoints) -> FormScore {
        self.evaluate(FormMetrics::measure(joints))
    }

    pub fn evaluate(&self, metrics: FormMetrics) -> FormScore {
        let c = &self.config;
        let mut cues = Vec::new();
        let mut deductions = Deductions::default();

        if let Some(angle) = metrics.knee_angle {
            if !in_range(angle, c.knee_angle_min, c.knee_angle_max) {
                if angle < c.knee_angle_min {
                    deductions.knee_angle =
                        capped((c.knee_angle_min - angle) / c.knee_deep_divisor, c.knee_deep_cap);
                    if deductions.knee_angle > c.knee_cue_deduction {
                        cues.push(CoachingCue::LessDepth);
                    }
                } else {
                    deductions.knee_angle = capped(
                        (angle - c.knee_angle_max) / c.knee_shallow_divisor,
                        c.knee_shallow_cap,
                    );
                    if deductions.knee_angle > c.knee_cue_deduction {
                        cues.push(CoachingCue::GoDeeper);
                    }
                }
            }
        }

        let (knee_forward, knee_forward_max) = match c.knee_forward_mode {
            KneeForwardMode::Percent => (metrics.knee_forward_percent, c.knee_forward_max_percent),
            KneeForwardMode::Pixels => (metrics.knee_forward_pixels, c.knee_forward_max_pixels),
        };
        if let Some(value) = knee_forward {
            if value > knee_forward_max {
                deductions.knee_forward = capped(value - knee_forward_max, c.knee_forward_cap);
                if deductions.knee_forward > c.knee_forward_cue_deduction {
                    cues.push(CoachingCue::KneesBack);
                }
            }
        }

        if let Some(angle) = metrics.back_angle {
            if angle > c.back_angle_max {
                deductions.back_angle = capped(angle - c.back_angle_max, c.back_cap);
                if deductions.back_angle > c.back_cue_deduction {
                    cues.push(CoachingCue::ChestUp);
                }
            }
        }

        let quality = (100.0 - deductions.total()).clamp(0.0, 100.0).round() as u32;
        let breakdown = self.breakdown(&metrics, &deductions, quality);

        FormScore {
            quality,
            metrics,
            deductions,
            cues,
            breakdown,
        }
    }

    fn breakdown(&self, metrics: &FormMetrics, deductions: &Deductions, quality: u32) -> String {
        let fmt = |value: Option<f32>, unit: &str| match value {
            Some(v) => format!("{:.1}{}", v, unit),
            None => "n/a".to_string(),
        };
        let knee_forward = match self.config.knee_forward_mode {
            KneeForwardMode::Percent => fmt(metrics.knee_forward_percent, "%"),
            KneeForwardMode::Pixels => fmt(metrics.knee_forward_pixels, "px"),
        };
        format!(
            "knee {} -{:.1} | knee fwd {} -{:.1} | back {} -{:.1} => {}/100",
            fmt(metrics.knee_angle, "°"),
            deductions.knee_angle,
            knee_forward,
            deductions.knee_forward,
            fmt(metrics.back_angle, "°"),
            deductions.back_angle,
            quality,
        )
    }
}

fn capped(deduction: f32, cap: f32) -> f32 {
    deduction.max(0.0).min(cap)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pose::Joint;
    use crate::tracker::side::BodySide;
    use proptest::prelude::*;

    fn scorer() -> FormScorer {
        FormScorer::from_config(&Config::default())
    }

    fn metrics(knee: f32, fwd: f32, back: f32) -> FormMetrics {
        FormMetrics {
            knee_angle: Some(knee),
            knee_forward_percent: Some(fwd),
            knee_forward_pixels: Some(fwd),
            back_angle: Some(back),
        }
    }

    /// 膝角度・膝前方%・背中角度から関節配置を作る（右向き, Yは下向き）
    fn posed(knee_angle: f32, knee_forward: f32, back_angle: f32) -> SideJoints {
        let (ax, ay) = (200.0f32, 550.0f32);
        let shin = 140.0;
        let thigh = 140.0;
        let torso = 150.0;
        let alpha = (knee_forward / 100.0).atan();
        let (kx, ky) = (ax + shin * alpha.sin(), ay - shin * alpha.cos());
        let t = alpha + knee_angle.to_radians();
        let (hx, hy) = (kx - thigh * t.sin(), ky + thigh * t.cos());
        let b = back_angle.to_radians();
        let (sx, sy) = (hx + torso * b.sin(), hy - torso * b.cos());
        SideJoints {
            side: BodySide::Left,
            shoulder: Joint::new(sx, sy, 0.9),
            hip: Joint::new(hx, hy, 0.9),
            knee: Joint::new(kx, ky, 0.9),
            ankle: Joint::new(ax, ay, 0.9),
            shoulder_substituted: false,
        }
    }

    #[test]
    fn test_measure_posed_joints() {
        let m = FormMetrics::measure(&posed(85.0, 20.0, 30.0));
        assert!((m.knee_angle.unwrap() - 85.0).abs() < 0.01);
        assert!((m.knee_forward_percent.unwrap() - 20.0).abs() < 0.01);
        assert!((m.back_angle.unwrap() - 30.0).abs() < 0.01);
    }

    #[test]
    fn test_perfect_form() {
        let score = scorer().score(&posed(85.0, 20.0, 30.0));
        assert_eq!(score.quality, 100);
        assert!(score.cues.is_empty());
        assert_eq!(score.deductions.total(), 0.0);
    }

    #[test]
    fn test_shallow_knee_angle() {
        let score = scorer().score(&posed(110.0, 20.0, 30.0));
        assert_eq!(score.quality, 85);
        assert_eq!(score.cues, vec![CoachingCue::GoDeeper]);
    }

    #[test]
    fn test_shallow_deduction_capped() {
        let score = scorer().evaluate(metrics(170.0, 0.0, 0.0));
        assert_eq!(score.deductions.knee_angle, 40.0);
        assert_eq!(score.quality, 60);
    }

    #[test]
    fn test_too_deep() {
        // (70 - 50) / 2 = 10
        let score = scorer().evaluate(metrics(50.0, 0.0, 0.0));
        assert_eq!(score.quality, 90);
        assert_eq!(score.cues, vec![CoachingCue::LessDepth]);

        // (70 - 62) / 2 = 4 はキューを出さない
        let score = scorer().evaluate(metrics(62.0, 0.0, 0.0));
        assert_eq!(score.quality, 96);
        assert!(score.cues.is_empty());

        let score = scorer().evaluate(metrics(0.0, 0.0, 0.0));
        assert_eq!(score.deductions.knee_angle, 15.0);
    }

    #[test]
    fn test_knees_forward() {
        let score = scorer().evaluate(metrics(85.0, 60.0, 30.0));
        assert_eq!(score.quality, 85);
        assert_eq!(score.cues, vec![CoachingCue::KneesBack]);

        // 減点 5 ではキューなし
        let score = scorer().evaluate(metrics(85.0, 50.0, 30.0));
        assert_eq!(score.quality, 95);
        assert!(score.cues.is_empty());
    }

    #[test]
    fn test_back_lean() {
        let score = scorer().score(&posed(85.0, 20.0, 70.0));
        assert_eq!(score.quality, 80);
        assert_eq!(score.cues, vec![CoachingCue::ChestUp]);
    }

    #[test]
    fn test_cue_order_and_floor() {
        let score = scorer().evaluate(metrics(180.0, 500.0, 90.0));
        assert_eq!(
            score.cues,
            vec![CoachingCue::GoDeeper, CoachingCue::KneesBack, CoachingCue::ChestUp]
        );
        assert_eq!(score.quality, 0);
    }

    #[test]
    fn test_unknown_metrics_not_penalized() {
        let score = scorer().evaluate(FormMetrics::default());
        assert_eq!(score.quality, 100);
        assert!(score.cues.is_empty());
        assert!(score.breakdown.contains("n/a"));
    }

    #[test]
    fn test_substituted_shoulder_has_no_back_angle() {
        let mut joints = posed(85.0, 20.0, 80.0);
        joints.shoulder = joints.hip;
        joints.shoulder_substituted = true;
        let score = scorer().score(&joints);
        assert_eq!(score.metrics.back_angle, None);
        assert_eq!(score.quality, 100);
    }

    #[test]
    fn test_pixel_mode() {
        let mut config = Config::default();
        config.scoring.knee_forward_mode = KneeForwardMode::Pixels;
        let scorer = FormScorer::from_config(&config);
        let score = scorer.evaluate(FormMetrics {
            knee_angle: Some(85.0),
            knee_forward_percent: Some(10.0),
            knee_forward_pixels: Some(50.0),
            back_angle: Some(30.0),
        });
        // 50px - 30px = 20
        assert_eq!(score.quality, 80);
        assert_eq!(score.cues, vec![CoachingCue::KneesBack]);
        assert!(score.breakdown.contains("px"));
    }

    #[test]
    fn test_strict_profile_range() {
        let scorer = FormScorer::from_config(&Config::strict());
        let score = scorer.evaluate(metrics(75.0, 0.0, 55.0));
        // (80 - 75) / 2 = 2.5, 背中 55 は 60 以内
        assert_eq!(score.deductions.knee_angle, 2.5);
        assert_eq!(score.deductions.back_angle, 0.0);
        assert_eq!(score.quality, 98);
    }

    #[test]
    fn test_cue_serialization() {
        let json = serde_json::to_string(&vec![CoachingCue::GoDeeper, CoachingCue::ChestUp]).unwrap();
        assert_eq!(json, r#"["GO DEEPER","CHEST UP"]"#);
        assert_eq!(CoachingCue::KneesBack.to_string(), "KNEES BACK");
    }

    proptest! {
        #[test]
        fn prop_score_in_range(
            knee in -720.0f32..720.0,
            fwd in -1000.0f32..1000.0,
            back in -360.0f32..360.0,
        ) {
            let score = scorer().evaluate(metrics(knee, fwd, back));
            prop_assert!(score.quality <= 100);
            let mut seen = std::collections::HashSet::new();
            for cue in &score.cues {
                prop_assert!(seen.insert(*cue));
            }
        }
    }
}
