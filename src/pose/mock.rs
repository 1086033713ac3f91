use std::str::FromStr;

use anyhow::bail;

use crate::pose::{JointIndex, JointObservation};
use crate::tracker::phase::SquatPhase;
use crate::tracker::side::BodySide;

/// 1サイクルのフレーム数（立位・下降・しゃがみ・上昇 各15）
pub const CYCLE_FRAMES: usize = 60;
const SEGMENT_FRAMES: usize = CYCLE_FRAMES / 4;

const SHIN: f32 = 140.0;
const THIGH: f32 = 140.0;
const TORSO: f32 = 150.0;
const ANKLE: (f32, f32) = (200.0, 550.0);

/// 生成するフォーム
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MockForm {
    #[default]
    Good,
    /// しゃがみ位置で上体が倒れる
    ChestDown,
    /// しゃがみ位置まで届かない
    Shallow,
}

impl FromStr for MockForm {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "good" => Ok(MockForm::Good),
            "chest" | "chest_down" => Ok(MockForm::ChestDown),
            "shallow" => Ok(MockForm::Shallow),
            other => bail!("unknown mock form: {} (expected good|chest|shallow)", other),
        }
    }
}

/// 関節配置を決める3つの角度
#[derive(Debug, Clone, Copy)]
struct Pose {
    knee_angle: f32,
    /// 脛の傾き（膝の前方移動 / 脛の高さ）
    knee_forward: f32,
    back_angle: f32,
}

impl Pose {
    const STANDING: Pose = Pose {
        knee_angle: 180.0,
        knee_forward: 0.0,
        back_angle: 5.0,
    };

    fn bottom(form: MockForm) -> Self {
        match form {
            MockForm::Good => Pose {
                knee_angle: 75.0,
                knee_forward: 0.1,
                back_angle: 30.0,
            },
            MockForm::ChestDown => Pose {
                knee_angle: 75.0,
                knee_forward: 0.1,
                back_angle: 70.0,
            },
            MockForm::Shallow => Pose {
                knee_angle: 110.0,
                knee_forward: 0.1,
                back_angle: 30.0,
            },
        }
    }

    fn lerp(a: Pose, b: Pose, t: f32) -> Pose {
        let mix = |x: f32, y: f32| x + (y - x) * t;
        Pose {
            knee_angle: mix(a.knee_angle, b.knee_angle),
            knee_forward: mix(a.knee_forward, b.knee_forward),
            back_angle: mix(a.back_angle, b.back_angle),
        }
    }
}

/// 横から撮ったスクワットの合成観測（右向き, Yは下向き）
///
/// 脛・腿の長さは固定で、膝角度を変えて腰の高さを動かす。
/// 立位の腰〜足首距離は 280。
pub struct MockSquatGenerator {
    frame: usize,
    form: MockForm,
    confidence: f32,
}

impl MockSquatGenerator {
    pub fn new(form: MockForm) -> Self {
        Self {
            frame: 0,
            form,
            confidence: 0.9,
        }
    }

    pub fn with_confidence(mut self, confidence: f32) -> Self {
        self.confidence = confidence;
        self
    }

    /// 次に生成するフレームが属する区間
    pub fn current_phase(&self) -> SquatPhase {
        match (self.frame % CYCLE_FRAMES) / SEGMENT_FRAMES {
            0 => SquatPhase::Standing,
            1 => SquatPhase::Descending,
            2 => SquatPhase::InSquat,
            _ => SquatPhase::Ascending,
        }
    }

    pub fn next_frame(&mut self) -> JointObservation {
        let pose = self.pose();
        self.frame += 1;

        let mut obs = JointObservation::new();
        self.place_side(&mut obs, pose, BodySide::Left);
        self.place_side(&mut obs, pose, BodySide::Right);
        obs
    }

    pub fn reset(&mut self) {
        self.frame = 0;
    }

    fn pose(&self) -> Pose {
        let i = self.frame % CYCLE_FRAMES;
        let progress = (i % SEGMENT_FRAMES) as f32 / SEGMENT_FRAMES as f32;
        let bottom = Pose::bottom(self.form);
        match self.current_phase() {
            SquatPhase::Standing => Pose::STANDING,
            SquatPhase::Descending => Pose::lerp(Pose::STANDING, bottom, progress),
            SquatPhase::InSquat => bottom,
            SquatPhase::Ascending => Pose::lerp(bottom, Pose::STANDING, progress),
        }
    }

    fn place_side(&self, obs: &mut JointObservation, pose: Pose, side: BodySide) {
        use JointIndex::*;
        let (shoulder, elbow, wrist, hip, knee, ankle, dx) = match side {
            BodySide::Left => (LeftShoulder, LeftElbow, LeftWrist, LeftHip, LeftKnee, LeftAnkle, -5.0),
            BodySide::Right => (
                RightShoulder,
                RightElbow,
                RightWrist,
                RightHip,
                RightKnee,
                RightAnkle,
                5.0,
            ),
            BodySide::Undetermined => return,
        };
        let c = self.confidence;

        let (ax, ay) = (ANKLE.0 + dx, ANKLE.1);
        let alpha = pose.knee_forward.atan();
        let (kx, ky) = (ax + SHIN * alpha.sin(), ay - SHIN * alpha.cos());
        let t = alpha + pose.knee_angle.to_radians();
        let (hx, hy) = (kx - THIGH * t.sin(), ky + THIGH * t.cos());
        let b = pose.back_angle.to_radians();
        let (sx, sy) = (hx + TORSO * b.sin(), hy - TORSO * b.cos());

        obs.set(ankle, ax, ay, c);
        obs.set(knee, kx, ky, c);
        obs.set(hip, hx, hy, c);
        obs.set(shoulder, sx, sy, c);
        // 腕は前に伸ばす
        obs.set(elbow, sx + 60.0, sy + 20.0, c);
        obs.set(wrist, sx + 120.0, sy + 20.0, c);
        if side == BodySide::Left {
            obs.set(Nose, sx + 15.0, sy - 50.0, c);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::tracker::geometry::interior_angle;
    use crate::tracker::{CoachingCue, RepKind, SquatAnalyzer};

    fn hip_to_ankle(obs: &JointObservation) -> f32 {
        let hip = obs.position(JointIndex::LeftHip).unwrap();
        let ankle = obs.position(JointIndex::LeftAnkle).unwrap();
        ankle.y - hip.y
    }

    #[test]
    fn test_cycle_repeats() {
        let mut generator = MockSquatGenerator::new(MockForm::Good);
        let first = generator.next_frame();
        for _ in 1..CYCLE_FRAMES {
            generator.next_frame();
        }
        assert_eq!(generator.next_frame(), first);
    }

    #[test]
    fn test_phase_segments() {
        let mut generator = MockSquatGenerator::new(MockForm::Good);
        let expected = [
            SquatPhase::Standing,
            SquatPhase::Descending,
            SquatPhase::InSquat,
            SquatPhase::Ascending,
        ];
        for phase in expected {
            for _ in 0..SEGMENT_FRAMES {
                assert_eq!(generator.current_phase(), phase);
                generator.next_frame();
            }
        }
        assert_eq!(generator.current_phase(), SquatPhase::Standing);
    }

    #[test]
    fn test_standing_and_bottom_geometry() {
        let mut generator = MockSquatGenerator::new(MockForm::Good);
        let standing = generator.next_frame();
        assert!((hip_to_ankle(&standing) - 280.0).abs() < 1e-3);

        for _ in 1..2 * SEGMENT_FRAMES {
            generator.next_frame();
        }
        let bottom = generator.next_frame();
        let hip = bottom.position(JointIndex::LeftHip).unwrap();
        let knee = bottom.position(JointIndex::LeftKnee).unwrap();
        let ankle = bottom.position(JointIndex::LeftAnkle).unwrap();
        assert!((interior_angle(hip, knee, ankle) - 75.0).abs() < 0.01);
        assert!(hip_to_ankle(&bottom) < 150.0);
        assert_eq!(bottom.confidence(JointIndex::RightKnee), Some(0.9));
        assert!(bottom.position(JointIndex::Nose).is_some());
    }

    #[test]
    fn test_good_form_counts_full_reps() {
        let mut generator = MockSquatGenerator::new(MockForm::Good);
        let mut analyzer = SquatAnalyzer::new(&Config::default());
        for _ in 0..3 * CYCLE_FRAMES {
            analyzer.process(&generator.next_frame());
        }

        let agg = analyzer.aggregate();
        assert_eq!(agg.full_reps, 3);
        assert_eq!(agg.partial_reps, 0);
        assert!(agg.average_quality >= 90, "average={}", agg.average_quality);
        assert!(agg.last_rep_cues.is_empty());
        let baseline = analyzer.calibration_baseline().unwrap();
        assert!(baseline > 200.0 && baseline <= 280.0, "baseline={}", baseline);
    }

    #[test]
    fn test_chest_down_gets_chest_up_cue() {
        let mut generator = MockSquatGenerator::new(MockForm::ChestDown);
        let mut analyzer = SquatAnalyzer::new(&Config::default());
        for _ in 0..CYCLE_FRAMES {
            analyzer.process(&generator.next_frame());
        }

        let rep = analyzer.history().last().cloned().unwrap();
        assert_eq!(rep.kind, RepKind::Full);
        assert!(rep.quality < 90, "quality={}", rep.quality);
        assert!(rep.cues.contains(&CoachingCue::ChestUp));
    }

    #[test]
    fn test_shallow_form_is_partial() {
        let mut generator = MockSquatGenerator::new(MockForm::Shallow);
        let mut analyzer = SquatAnalyzer::new(&Config::default());
        for _ in 0..2 * CYCLE_FRAMES {
            analyzer.process(&generator.next_frame());
        }

        let agg = analyzer.aggregate();
        assert_eq!(agg.full_reps, 0);
        assert_eq!(agg.partial_reps, 2);
        assert_eq!(agg.last_rep_cues, vec![CoachingCue::GoDeeper]);
        assert_eq!(analyzer.calibration_baseline(), None);
    }

    #[test]
    fn test_low_confidence_is_unusable() {
        let mut generator = MockSquatGenerator::new(MockForm::Good).with_confidence(0.3);
        let mut analyzer = SquatAnalyzer::new(&Config::default());
        for _ in 0..CYCLE_FRAMES {
            let report = analyzer.process(&generator.next_frame());
            assert_eq!(report.analysis.cues, vec![CoachingCue::Reposition]);
        }
        assert_eq!(analyzer.aggregate().total_attempts(), 0);

        generator.reset();
        assert_eq!(generator.current_phase(), SquatPhase::Standing);
    }

    #[test]
    fn test_parse_form() {
        assert_eq!("good".parse::<MockForm>().unwrap(), MockForm::Good);
        assert_eq!("chest".parse::<MockForm>().unwrap(), MockForm::ChestDown);
        assert_eq!("shallow".parse::<MockForm>().unwrap(), MockForm::Shallow);
        assert!("sideways".parse::<MockForm>().is_err());
    }
}
