use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// 解析エンジン全体の設定
///
/// `profile` で基準値のプリセットを選び、各セクションのキーで個別に上書きする。
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub profile: TuningProfile,
    #[serde(default)]
    pub detection: DetectionConfig,
    #[serde(default)]
    pub side: SideConfig,
    #[serde(default)]
    pub phase: PhaseConfig,
    #[serde(default)]
    pub scoring: ScoringConfig,
    #[serde(default)]
    pub reps: RepConfig,
}

/// 閾値プリセット
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TuningProfile {
    /// 膝角度 70〜95°, 信頼度 0.45, 背中 50°
    #[default]
    Standard,
    /// 膝角度 80〜100°, 信頼度 0.5, 背中 60°
    Strict,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// 関節ごとの信頼度閾値
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f32,
    /// 想定フレームレート（速度正規化の基準）
    #[serde(default = "default_target_fps")]
    pub target_fps: f32,
}

fn default_confidence_threshold() -> f32 { 0.45 }
fn default_target_fps() -> f32 { 15.0 }

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            confidence_threshold: default_confidence_threshold(),
            target_fps: default_target_fps(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideConfig {
    /// 左右切替のヒステリシス幅（平均信頼度の差）
    #[serde(default = "default_switch_margin")]
    pub switch_margin: f32,
    /// 両側とも使える場合に要求する最低平均信頼度
    #[serde(default = "default_min_average_confidence")]
    pub min_average_confidence: f32,
}

fn default_switch_margin() -> f32 { 0.15 }
fn default_min_average_confidence() -> f32 { 0.55 }

impl Default for SideConfig {
    fn default() -> Self {
        Self {
            switch_margin: default_switch_margin(),
            min_average_confidence: default_min_average_confidence(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhaseConfig {
    /// フェーズ確定に必要な連続フレーム数
    #[serde(default = "default_debounce_frames")]
    pub debounce_frames: u32,
    /// キャリブレーション前の立位判定距離（腰〜足首）
    #[serde(default = "default_fallback_standing_distance")]
    pub fallback_standing_distance: f32,
    /// キャリブレーション前のしゃがみ判定距離
    #[serde(default = "default_fallback_depth_distance")]
    pub fallback_depth_distance: f32,
    /// 基準距離に対する立位判定の割合
    #[serde(default = "default_standing_ratio")]
    pub standing_ratio: f32,
    /// 基準距離に対するしゃがみ判定の割合
    #[serde(default = "default_depth_ratio")]
    pub depth_ratio: f32,
    /// 腰の移動量のノイズ幅（単位/フレーム）
    #[serde(default = "default_velocity_noise_floor")]
    pub velocity_noise_floor: f32,
    /// 上昇中に立位とみなす腰〜足首距離
    #[serde(default = "default_near_top_distance")]
    pub near_top_distance: f32,
    /// 上昇中に立位とみなす最大移動量
    #[serde(default = "default_near_top_velocity")]
    pub near_top_velocity: f32,
}

fn default_debounce_frames() -> u32 { 5 }
fn default_fallback_standing_distance() -> f32 { 270.0 }
fn default_fallback_depth_distance() -> f32 { 150.0 }
fn default_standing_ratio() -> f32 { 0.85 }
fn default_depth_ratio() -> f32 { 0.50 }
fn default_velocity_noise_floor() -> f32 { 3.0 }
fn default_near_top_distance() -> f32 { 200.0 }
fn default_near_top_velocity() -> f32 { 15.0 }

impl Default for PhaseConfig {
    fn default() -> Self {
        Self {
            debounce_frames: default_debounce_frames(),
            fallback_standing_distance: default_fallback_standing_distance(),
            fallback_depth_distance: default_fallback_depth_distance(),
            standing_ratio: default_standing_ratio(),
            depth_ratio: default_depth_ratio(),
            velocity_noise_floor: default_velocity_noise_floor(),
            near_top_distance: default_near_top_distance(),
            near_top_velocity: default_near_top_velocity(),
        }
    }
}

/// 膝の前方移動の測り方
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KneeForwardMode {
    /// 脛の長さに対する割合
    #[default]
    Percent,
    /// 膝と足首の水平距離（ピクセル）
    Pixels,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoringConfig {
    #[serde(default = "default_knee_angle_min")]
    pub knee_angle_min: f32,
    #[serde(default = "default_knee_angle_max")]
    pub knee_angle_max: f32,
    /// 深すぎる場合の減点: (min - angle) / divisor, 上限 cap
    #[serde(default = "default_knee_deep_divisor")]
    pub knee_deep_divisor: f32,
    #[serde(default = "default_knee_deep_cap")]
    pub knee_deep_cap: f32,
    /// 浅すぎる場合の減点: (angle - max) / divisor, 上限 cap
    #[serde(default = "default_knee_shallow_divisor")]
    pub knee_shallow_divisor: f32,
    #[serde(default = "default_knee_shallow_cap")]
    pub knee_shallow_cap: f32,
    #[serde(default)]
    pub knee_forward_mode: KneeForwardMode,
    #[serde(default = "default_knee_forward_max_percent")]
    pub knee_forward_max_percent: f32,
    #[serde(default = "default_knee_forward_max_pixels")]
    pub knee_forward_max_pixels: f32,
    #[serde(default = "default_knee_forward_cap")]
    pub knee_forward_cap: f32,
    /// 背中の鉛直からの最大角度
    #[serde(default = "default_back_angle_max")]
    pub back_angle_max: f32,
    #[serde(default = "default_back_cap")]
    pub back_cap: f32,
    /// この減点を超えたらコーチングキューを出す
    #[serde(default = "default_knee_cue_deduction")]
    pub knee_cue_deduction: f32,
    #[serde(default = "default_knee_forward_cue_deduction")]
    pub knee_forward_cue_deduction: f32,
    #[serde(default = "default_back_cue_deduction")]
    pub back_cue_deduction: f32,
}

fn default_knee_angle_min() -> f32 { 70.0 }
fn default_knee_angle_max() -> f32 { 95.0 }
fn default_knee_deep_divisor() -> f32 { 2.0 }
fn default_knee_deep_cap() -> f32 { 15.0 }
fn default_knee_shallow_divisor() -> f32 { 1.0 }
fn default_knee_shallow_cap() -> f32 { 40.0 }
fn default_knee_forward_max_percent() -> f32 { 45.0 }
fn default_knee_forward_max_pixels() -> f32 { 30.0 }
fn default_knee_forward_cap() -> f32 { 30.0 }
fn default_back_angle_max() -> f32 { 50.0 }
fn default_back_cap() -> f32 { 30.0 }
fn default_knee_cue_deduction() -> f32 { 5.0 }
fn default_knee_forward_cue_deduction() -> f32 { 10.0 }
fn default_back_cue_deduction() -> f32 { 10.0 }

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            knee_angle_min: default_knee_angle_min(),
            knee_angle_max: default_knee_angle_max(),
            knee_deep_divisor: default_knee_deep_divisor(),
            knee_deep_cap: default_knee_deep_cap(),
            knee_shallow_divisor: default_knee_shallow_divisor(),
            knee_shallow_cap: default_knee_shallow_cap(),
            knee_forward_mode: KneeForwardMode::default(),
            knee_forward_max_percent: default_knee_forward_max_percent(),
            knee_forward_max_pixels: default_knee_forward_max_pixels(),
            knee_forward_cap: default_knee_forward_cap(),
            back_angle_max: default_back_angle_max(),
            back_cap: default_back_cap(),
            knee_cue_deduction: default_knee_cue_deduction(),
            knee_forward_cue_deduction: default_knee_forward_cue_deduction(),
            back_cue_deduction: default_back_cue_deduction(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RepConfig {
    /// しゃがみ切らなかった試行に付ける固定スコア
    #[serde(default = "default_partial_rep_score")]
    pub partial_rep_score: u32,
    /// 1レップあたりのキュー上限
    #[serde(default = "default_max_rep_cues")]
    pub max_rep_cues: usize,
    /// 支配的キューとみなすフレーム割合（これを超えたら採用）
    #[serde(default = "default_dominant_cue_fraction")]
    pub dominant_cue_fraction: f32,
    /// 良いフォームとみなすスコア
    #[serde(default = "default_good_form_score")]
    pub good_form_score: u32,
}

fn default_partial_rep_score() -> u32 { 30 }
fn default_max_rep_cues() -> usize { 3 }
fn default_dominant_cue_fraction() -> f32 { 1.0 / 3.0 }
fn default_good_form_score() -> u32 { 70 }

impl Default for RepConfig {
    fn default() -> Self {
        Self {
            partial_rep_score: default_partial_rep_score(),
            max_rep_cues: default_max_rep_cues(),
            dominant_cue_fraction: default_dominant_cue_fraction(),
            good_form_score: default_good_form_score(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::standard()
    }
}

impl Config {
    pub fn standard() -> Self {
        Self {
            profile: TuningProfile::Standard,
            detection: DetectionConfig::default(),
            side: SideConfig::default(),
            phase: PhaseConfig::default(),
            scoring: ScoringConfig::default(),
            reps: RepConfig::default(),
        }
    }

    pub fn strict() -> Self {
        let mut config = Self::standard();
        config.profile = TuningProfile::Strict;
        config.detection.confidence_threshold = 0.5;
        config.side.min_average_confidence = 0.6;
        config.scoring.knee_angle_min = 80.0;
        config.scoring.knee_angle_max = 100.0;
        config.scoring.back_angle_max = 60.0;
        config
    }

    pub fn for_profile(profile: TuningProfile) -> Self {
        match profile {
            TuningProfile::Standard => Self::standard(),
            TuningProfile::Strict => Self::strict(),
        }
    }

    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        Self::from_toml_str(&content)
            .with_context(|| format!("Failed to parse config file {}", path.display()))
    }

    /// プリセットを土台に TOML のキーを上書きする
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let user: toml::Table = toml::from_str(content)?;
        let profile = match user.get("profile") {
            Some(value) => TuningProfile::deserialize(value.clone())?,
            None => TuningProfile::default(),
        };

        let mut merged = match toml::Value::try_from(Self::for_profile(profile))? {
            toml::Value::Table(table) => table,
            _ => bail!("preset did not serialize to a table"),
        };
        merge_tables(&mut merged, user);
        let config: Config = toml::Value::Table(merged).try_into()?;
        Ok(config)
    }

    /// 読めなければデフォルト設定で続行
    pub fn load_or_default<P: AsRef<Path>>(path: P) -> Self {
        let path = path.as_ref();
        if !path.exists() {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            return Self::default();
        }
        match Self::load(path) {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!(path = %path.display(), "invalid config, using defaults: {:#}", e);
                Self::default()
            }
        }
    }
}

fn merge_tables(base: &mut toml::Table, overlay: toml::Table) {
    for (key, value) in overlay {
        match (base.get_mut(&key), value) {
            (Some(toml::Value::Table(base_sub)), toml::Value::Table(sub)) => {
                merge_tables(base_sub, sub);
            }
            (_, value) => {
                base.insert(key, value);
            }
        }
    }
}
