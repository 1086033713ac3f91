use serde::{Deserialize, Serialize};

use crate::config::PhaseConfig;

/// スクワットの動作フェーズ
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SquatPhase {
    #[default]
    Standing,
    Descending,
    InSquat,
    Ascending,
}

impl std::fmt::Display for SquatPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SquatPhase::Standing => "standing",
            SquatPhase::Descending => "descending",
            SquatPhase::InSquat => "in_squat",
            SquatPhase::Ascending => "ascending",
        };
        f.write_str(s)
    }
}

/// 現在の判定閾値（腰〜足首距離）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseThresholds {
    pub standing: f32,
    pub depth: f32,
}

/// 1フレーム分の判定結果
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PhaseUpdate {
    /// 確定フェーズ
    pub phase: SquatPhase,
    /// このフレーム前の確定フェーズ
    pub previous: SquatPhase,
    /// このフレームの候補
    pub proposed: SquatPhase,
    pub hip_to_ankle: f32,
    /// このフレームで基準距離が決まった
    pub calibrated: bool,
}

impl PhaseUpdate {
    pub fn changed(&self) -> bool {
        self.phase != self.previous
    }
}

/// 腰の高さからフェーズを判定するステートマシン
///
/// 候補フェーズが `debounce_frames` 回連続したときだけ遷移する。
/// 最初にしゃがみ切ったレップの立位復帰時に腰〜足首距離を基準として記録し、
/// 以降の閾値は基準の割合で決める。
pub struct PhaseMachine {
    config: PhaseConfig,
    current: SquatPhase,
    previous_hip_y: Option<f32>,
    last_velocity: f32,
    /// 次のフレームは前回の速度をそのまま使う
    hold_velocity: bool,
    pending: Option<SquatPhase>,
    pending_frames: u32,
    baseline: Option<f32>,
    /// 前回の立位以降にしゃがみ位置へ到達したか
    reached_depth: bool,
}

impl PhaseMachine {
    pub fn new(config: &PhaseConfig) -> Self {
        Self {
            config: config.clone(),
            current: SquatPhase::Standing,
            previous_hip_y: None,
            last_velocity: 0.0,
            hold_velocity: false,
            pending: None,
            pending_frames: 0,
            baseline: None,
            reached_depth: false,
        }
    }

    pub fn phase(&self) -> SquatPhase {
        self.current
    }

    pub fn baseline(&self) -> Option<f32> {
        self.baseline
    }

    pub fn thresholds(&self) -> PhaseThresholds {
        match self.baseline {
            Some(baseline) => PhaseThresholds {
                standing: baseline * self.config.standing_ratio,
                depth: baseline * self.config.depth_ratio,
            },
            None => PhaseThresholds {
                standing: self.config.fallback_standing_distance,
                depth: self.config.fallback_depth_distance,
            },
        }
    }

    /// 次のフレームの腰の移動量を無視し、前回の速度を引き継ぐ
    ///
    /// 左右の参照側が入れ替わるフレームの前に呼ぶ（左右の高さの差は移動ではない）。
    pub fn carry_velocity(&mut self) {
        self.hold_velocity = true;
    }

    /// 1フレーム進める（速度は 単位/フレーム）
    pub fn update(&mut self, hip_y: f32, knee_y: f32, ankle_y: f32) -> PhaseUpdate {
        self.update_scaled(hip_y, knee_y, ankle_y, 1.0)
    }

    /// 1フレーム進める
    ///
    /// `velocity_scale` は腰の移動量に掛ける係数。フレーム間隔が一定でない場合に
    /// 想定フレームレート換算の移動量へ正規化するために使う。
    pub fn update_scaled(
        &mut self,
        hip_y: f32,
        knee_y: f32,
        ankle_y: f32,
        velocity_scale: f32,
    ) -> PhaseUpdate {
        let hip_to_ankle = ankle_y - hip_y;
        let velocity = if self.hold_velocity {
            self.last_velocity
        } else {
            self.previous_hip_y
                .map_or(0.0, |prev| (hip_y - prev) * velocity_scale)
        };
        let proposed = self.propose(hip_to_ankle, velocity);

        tracing::debug!(
            hip_y,
            knee_y,
            ankle_y,
            hip_to_ankle,
            velocity,
            %proposed,
            current = %self.current,
            "phase proposal"
        );

        let previous = self.current;
        let calibrated = self.debounce(proposed, hip_to_ankle);
        self.previous_hip_y = Some(hip_y);
        self.last_velocity = velocity;
        self.hold_velocity = false;

        PhaseUpdate {
            phase: self.current,
            previous,
            proposed,
            hip_to_ankle,
            calibrated,
        }
    }

    pub fn reset(&mut self) {
        self.current = SquatPhase::Standing;
        self.previous_hip_y = None;
        self.last_velocity = 0.0;
        self.hold_velocity = false;
        self.pending = None;
        self.pending_frames = 0;
        self.baseline = None;
        self.reached_depth = false;
    }

    fn propose(&self, hip_to_ankle: f32, velocity: f32) -> SquatPhase {
        let thresholds = self.thresholds();
        let floor = self.config.velocity_noise_floor;

        if hip_to_ankle < thresholds.depth {
            return SquatPhase::InSquat;
        }
        if hip_to_ankle > thresholds.standing {
            return SquatPhase::Standing;
        }

        // 上昇中に頂点付近で止まった場合は立位とみなす
        if self.current == SquatPhase::Ascending
            && hip_to_ankle > self.config.near_top_distance
            && velocity.abs() < self.config.near_top_velocity
        {
            return SquatPhase::Standing;
        }

        if velocity > floor {
            SquatPhase::Descending
        } else if velocity < -floor {
            SquatPhase::Ascending
        } else if self.current == SquatPhase::Ascending {
            SquatPhase::Standing
        } else {
            self.current
        }
    }

    /// 候補を積み上げ、確定したら遷移する。基準距離を記録したら true
    fn debounce(&mut self, proposed: SquatPhase, hip_to_ankle: f32) -> bool {
        if self.pending == Some(proposed) {
            self.pending_frames += 1;
        } else {
            self.pending = Some(proposed);
            self.pending_frames = 1;
        }

        if self.pending_frames < self.config.debounce_frames.max(1) {
            return false;
        }
        self.pending = None;
        self.pending_frames = 0;

        if proposed == self.current {
            return false;
        }

        let from = self.current;
        self.current = proposed;
        tracing::info!(%from, to = %proposed, hip_to_ankle, "phase transition");

        let mut calibrated = false;
        match proposed {
            SquatPhase::InSquat => self.reached_depth = true,
            SquatPhase::Standing => {
                if from == SquatPhase::Ascending && self.reached_depth && self.baseline.is_none() {
                    self.baseline = Some(hip_to_ankle);
                    calibrated = true;
                    tracing::info!(
                        baseline = hip_to_ankle,
                        standing = hip_to_ankle * self.config.standing_ratio,
                        depth = hip_to_ankle * self.config.depth_ratio,
                        "standing baseline calibrated"
                    );
                }
                self.reached_depth = false;
            }
            _ => {}
        }
        calibrated
    }
}
