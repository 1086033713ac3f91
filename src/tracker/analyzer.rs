use std::time::Duration;

use serde::Serialize;

use crate::config::Config;
use crate::pose::JointObservation;
use crate::tracker::phase::{PhaseMachine, SquatPhase};
use crate::tracker::reps::{CompletedRep, RepAggregator, SessionAggregate, SessionSummary};
use crate::tracker::scoring::{CoachingCue, FormScorer};
use crate::tracker::side::{BodySide, SideSelector};

/// スコアの段階（表示色などに使う）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityBand {
    /// 85 以上
    Good,
    /// 70 以上
    Fair,
    Poor,
}

impl QualityBand {
    pub fn from_quality(quality: u32) -> Self {
        if quality >= 85 {
            QualityBand::Good
        } else if quality >= 70 {
            QualityBand::Fair
        } else {
            QualityBand::Poor
        }
    }
}

/// 1フレームの解析結果
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct FormAnalysisResult {
    /// しゃがみ位置以外では None
    pub quality: Option<u32>,
    pub knee_angle: Option<f32>,
    pub knee_forward_percent: Option<f32>,
    pub back_angle: Option<f32>,
    pub phase: SquatPhase,
    /// 解析に使った側。使える側が無ければ Undetermined
    pub side: BodySide,
    pub cues: Vec<CoachingCue>,
    pub score_breakdown: Option<String>,
}

impl FormAnalysisResult {
    /// 使える側が無いフレーム
    fn reposition(phase: SquatPhase) -> Self {
        Self {
            quality: Some(0),
            phase,
            side: BodySide::Undetermined,
            cues: vec![CoachingCue::Reposition],
            ..Self::default()
        }
    }

    pub fn is_good_form(&self) -> bool {
        self.quality.map_or(false, |q| q >= 70)
    }

    pub fn quality_band(&self) -> Option<QualityBand> {
        self.quality.map(QualityBand::from_quality)
    }
}

/// `process` の戻り値
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameReport {
    pub analysis: FormAnalysisResult,
    /// このフレームで確定したレップ
    pub completed_rep: Option<CompletedRep>,
    pub phase_changed: bool,
}

/// スクワット解析エンジン
///
/// 観測を1フレームずつ受け取り、側の選択 → フェーズ判定 → （しゃがみ位置なら）採点
/// → レップ集計 の順に流す。状態はすべてこの構造体が持つ。
/// スレッド間で共有する場合は呼び出し側で直列化すること。
pub struct SquatAnalyzer {
    config: Config,
    side: SideSelector,
    phase: PhaseMachine,
    scorer: FormScorer,
    reps: RepAggregator,
    /// 直前に解析した側
    last_side: BodySide,
}

impl SquatAnalyzer {
    pub fn new(config: &Config) -> Self {
        Self {
            config: config.clone(),
            side: SideSelector::from_config(config),
            phase: PhaseMachine::new(&config.phase),
            scorer: FormScorer::from_config(config),
            reps: RepAggregator::from_config(config),
            last_side: BodySide::Undetermined,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// 一定間隔で届くフレームを処理する
    pub fn process(&mut self, obs: &JointObservation) -> FrameReport {
        self.process_scaled(obs, 1.0)
    }

    /// 前フレームからの経過時間付きで処理する
    ///
    /// 腰の移動量を `detection.target_fps` のフレーム間隔に換算してから判定する。
    pub fn process_timed(&mut self, obs: &JointObservation, elapsed: Duration) -> FrameReport {
        let dt = elapsed.as_secs_f32();
        let fps = self.config.detection.target_fps;
        let scale = if dt > 0.0 && fps > 0.0 {
            (1.0 / fps) / dt
        } else {
            1.0
        };
        self.process_scaled(obs, scale)
    }

    fn process_scaled(&mut self, obs: &JointObservation, velocity_scale: f32) -> FrameReport {
        let obs = obs.sanitized();
        let phase_before = self.phase.phase();

        let Some(joints) = self.side.select(&obs, phase_before) else {
            // フェーズは進めない（デバウンスのカウントにも影響させない）
            tracing::debug!(phase = %phase_before, "no usable side");
            let analysis = FormAnalysisResult::reposition(phase_before);
            let completed_rep = self.reps.update(&analysis);
            return FrameReport {
                analysis,
                completed_rep,
                phase_changed: false,
            };
        };

        if self.last_side != BodySide::Undetermined && joints.side != self.last_side {
            self.phase.carry_velocity();
        }
        self.last_side = joints.side;

        let update = self.phase.update_scaled(
            joints.hip.position.y,
            joints.knee.position.y,
            joints.ankle.position.y,
            velocity_scale,
        );

        let mut analysis = FormAnalysisResult {
            phase: update.phase,
            side: joints.side,
            ..FormAnalysisResult::default()
        };
        if update.phase == SquatPhase::InSquat {
            let score = self.scorer.score(&joints);
            analysis.quality = Some(score.quality);
            analysis.knee_angle = score.metrics.knee_angle;
            analysis.knee_forward_percent = score.metrics.knee_forward_percent;
            analysis.back_angle = score.metrics.back_angle;
            analysis.cues = score.cues;
            analysis.score_breakdown = Some(score.breakdown);
        }

        let completed_rep = self.reps.update(&analysis);
        FrameReport {
            analysis,
            completed_rep,
            phase_changed: update.changed(),
        }
    }

    pub fn phase(&self) -> SquatPhase {
        self.phase.phase()
    }

    pub fn calibration_baseline(&self) -> Option<f32> {
        self.phase.baseline()
    }

    pub fn current_side(&self) -> BodySide {
        self.side.current_side()
    }

    pub fn is_side_locked(&self) -> bool {
        self.side.locked_side().is_some()
    }

    pub fn aggregate(&self) -> SessionAggregate {
        self.reps.aggregate()
    }

    pub fn summary(&self) -> SessionSummary {
        self.reps.summary()
    }

    pub fn history(&self) -> &[CompletedRep] {
        self.reps.history()
    }

    /// セッション開始時の状態に戻す（進行中のレップは捨てる）
    pub fn reset(&mut self) {
        self.side.reset();
        self.phase.reset();
        self.reps.reset();
        self.last_side = BodySide::Undetermined;
        tracing::info!("analyzer reset");
    }
}
