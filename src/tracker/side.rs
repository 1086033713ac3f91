use serde::{Deserialize, Serialize};

use crate::config::{Config, SideConfig};
use crate::pose::{Joint, JointIndex, JointObservation};
use crate::tracker::phase::SquatPhase;

/// 解析に使う体の側
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodySide {
    Left,
    Right,
    #[default]
    Undetermined,
}

impl BodySide {
    /// (肩, 腰, 膝, 足首)
    fn joints(self) -> Option<(JointIndex, JointIndex, JointIndex, JointIndex)> {
        use JointIndex::*;
        match self {
            BodySide::Left => Some((LeftShoulder, LeftHip, LeftKnee, LeftAnkle)),
            BodySide::Right => Some((RightShoulder, RightHip, RightKnee, RightAnkle)),
            BodySide::Undetermined => None,
        }
    }
}

impl std::fmt::Display for BodySide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            BodySide::Left => "left",
            BodySide::Right => "right",
            BodySide::Undetermined => "undetermined",
        };
        f.write_str(s)
    }
}

/// 片側4関節（肩・腰・膝・足首）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SideJoints {
    pub side: BodySide,
    pub shoulder: Joint,
    pub hip: Joint,
    pub knee: Joint,
    pub ankle: Joint,
    /// 肩が使えず腰で代用した
    pub shoulder_substituted: bool,
}

impl SideJoints {
    pub fn average_confidence(&self) -> f32 {
        (self.shoulder.confidence + self.hip.confidence + self.knee.confidence + self.ankle.confidence)
            / 4.0
    }
}

/// フレームごとに左右どちらを解析するか選ぶ
///
/// - 腰・膝・足首は必須、肩は無ければ腰で代用（4点中3点以上）
/// - 両側使える場合は平均信頼度で比較し、差が margin 以内なら現在の側を維持
/// - 立位を離れたらレップ終了まで側を固定（固定側が使えないフレームだけ反対側）
pub struct SideSelector {
    confidence_threshold: f32,
    switch_margin: f32,
    min_average_confidence: f32,
    current_side: BodySide,
    locked_side: Option<BodySide>,
}

impl SideSelector {
    pub fn new(confidence_threshold: f32, side: &SideConfig) -> Self {
        Self {
            confidence_threshold,
            switch_margin: side.switch_margin,
            min_average_confidence: side.min_average_confidence,
            current_side: BodySide::Undetermined,
            locked_side: None,
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(config.detection.confidence_threshold, &config.side)
    }

    pub fn current_side(&self) -> BodySide {
        self.current_side
    }

    pub fn locked_side(&self) -> Option<BodySide> {
        self.locked_side
    }

    /// 観測から片側を選ぶ。使える側が無ければ None
    ///
    /// `phase` は直前に確定したフェーズ。
    pub fn select(&mut self, obs: &JointObservation, phase: SquatPhase) -> Option<SideJoints> {
        let left = self.gather(obs, BodySide::Left);
        let right = self.gather(obs, BodySide::Right);

        if phase == SquatPhase::Standing {
            if let Some(side) = self.locked_side.take() {
                tracing::debug!(%side, "side lock released");
            }
        } else if self.locked_side.is_none() && self.current_side != BodySide::Undetermined {
            self.locked_side = Some(self.current_side);
            tracing::debug!(side = %self.current_side, %phase, "side locked for repetition");
        }

        if let Some(locked) = self.locked_side {
            let (own, other) = match locked {
                BodySide::Right => (right, left),
                _ => (left, right),
            };
            if own.is_some() {
                return own;
            }
            if let Some(ref fallback) = other {
                tracing::debug!(locked = %locked, fallback = %fallback.side, "locked side unusable, using other side for this frame");
            }
            return other;
        }

        let chosen = self.select_with_hysteresis(left, right);
        if phase != SquatPhase::Standing {
            if let Some(ref joints) = chosen {
                self.locked_side = Some(joints.side);
                tracing::debug!(side = %joints.side, %phase, "side locked for repetition");
            }
        }
        chosen
    }

    pub fn reset(&mut self) {
        self.current_side = BodySide::Undetermined;
        self.locked_side = None;
    }

    fn gather(&self, obs: &JointObservation, side: BodySide) -> Option<SideJoints> {
        let (shoulder_idx, hip_idx, knee_idx, ankle_idx) = side.joints()?;
        let threshold = self.confidence_threshold;
        let valid = |idx| obs.get(idx).filter(|j: &Joint| j.is_valid(threshold));

        let hip = valid(hip_idx)?;
        let knee = valid(knee_idx)?;
        let ankle = valid(ankle_idx)?;
        let (shoulder, shoulder_substituted) = match valid(shoulder_idx) {
            Some(shoulder) => (shoulder, false),
            None => (hip, true),
        };

        Some(SideJoints {
            side,
            shoulder,
            hip,
            knee,
            ankle,
            shoulder_substituted,
        })
    }

    fn select_with_hysteresis(
        &mut self,
        left: Option<SideJoints>,
        right: Option<SideJoints>,
    ) -> Option<SideJoints> {
        let (left, right) = match (left, right) {
            (None, None) => return None,
            (Some(l), None) => {
                self.switch_to(BodySide::Left, l.average_confidence());
                return Some(l);
            }
            (None, Some(r)) => {
                self.switch_to(BodySide::Right, r.average_confidence());
                return Some(r);
            }
            (Some(l), Some(r)) => (l, r),
        };

        let left_conf = left.average_confidence();
        let right_conf = right.average_confidence();
        if left_conf < self.min_average_confidence && right_conf < self.min_average_confidence {
            return None;
        }

        let better = if left_conf >= right_conf {
            BodySide::Left
        } else {
            BodySide::Right
        };
        let next = match self.current_side {
            BodySide::Left if right_conf <= left_conf + self.switch_margin => BodySide::Left,
            BodySide::Right if left_conf <= right_conf + self.switch_margin => BodySide::Right,
            _ => better,
        };

        match next {
            BodySide::Right => {
                self.switch_to(BodySide::Right, right_conf);
                Some(right)
            }
            _ => {
                self.switch_to(BodySide::Left, left_conf);
                Some(left)
            }
        }
    }

    fn switch_to(&mut self, side: BodySide, confidence: f32) {
        if self.current_side != side {
            tracing::info!(from = %self.current_side, to = %side, confidence, "side switch");
            self.current_side = side;
        }
    }
}
