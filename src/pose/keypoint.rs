use serde::{Deserialize, Serialize};

/// 姿勢推定ソースが出力する 13 関節のインデックス
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(usize)]
pub enum JointIndex {
    Nose = 0,
    LeftShoulder = 1,
    RightShoulder = 2,
    LeftElbow = 3,
    RightElbow = 4,
    LeftWrist = 5,
    RightWrist = 6,
    LeftHip = 7,
    RightHip = 8,
    LeftKnee = 9,
    RightKnee = 10,
    LeftAnkle = 11,
    RightAnkle = 12,
}

impl JointIndex {
    pub const COUNT: usize = 13;

    pub const ALL: [JointIndex; JointIndex::COUNT] = [
        Self::Nose,
        Self::LeftShoulder,
        Self::RightShoulder,
        Self::LeftElbow,
        Self::RightElbow,
        Self::LeftWrist,
        Self::RightWrist,
        Self::LeftHip,
        Self::RightHip,
        Self::LeftKnee,
        Self::RightKnee,
        Self::LeftAnkle,
        Self::RightAnkle,
    ];
}

/// 2D座標（画面座標系: Yは下向きが正）
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// 検出された単一関節
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Joint {
    pub position: Point,
    /// 信頼度スコア (0.0〜1.0)
    pub confidence: f32,
}

impl Joint {
    pub fn new(x: f32, y: f32, confidence: f32) -> Self {
        Self {
            position: Point::new(x, y),
            confidence,
        }
    }

    /// 信頼度が閾値以上か
    pub fn is_valid(&self, threshold: f32) -> bool {
        self.confidence >= threshold
    }
}

/// 1フレーム分の関節観測
///
/// 位置が無い関節は「このフレームでは未検出」を意味する。
/// 信頼度は位置と並行に持ち、位置だけ・信頼度だけの関節もあり得る。
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JointObservation {
    #[serde(default)]
    pub positions: [Option<Point>; JointIndex::COUNT],
    #[serde(default)]
    pub confidences: [Option<f32>; JointIndex::COUNT],
}

impl JointObservation {
    pub fn new() -> Self {
        Self::default()
    }

    /// 位置と信頼度をまとめて設定
    pub fn with_joint(mut self, index: JointIndex, x: f32, y: f32, confidence: f32) -> Self {
        self.set(index, x, y, confidence);
        self
    }

    pub fn set(&mut self, index: JointIndex, x: f32, y: f32, confidence: f32) {
        self.positions[index as usize] = Some(Point::new(x, y));
        self.confidences[index as usize] = Some(confidence);
    }

    pub fn remove(&mut self, index: JointIndex) {
        self.positions[index as usize] = None;
        self.confidences[index as usize] = None;
    }

    pub fn position(&self, index: JointIndex) -> Option<Point> {
        self.positions[index as usize]
    }

    pub fn confidence(&self, index: JointIndex) -> Option<f32> {
        self.confidences[index as usize]
    }

    /// 位置と信頼度が両方ある関節だけを返す
    pub fn get(&self, index: JointIndex) -> Option<Joint> {
        let position = self.position(index)?;
        let confidence = self.confidence(index)?;
        Some(Joint {
            position,
            confidence,
        })
    }

    /// 入力境界での整形
    ///
    /// 信頼度は [0, 1] にクランプする。非有限の座標・信頼度は未検出扱い。
    pub fn sanitized(&self) -> Self {
        let mut out = self.clone();
        for index in JointIndex::ALL {
            let i = index as usize;
            if let Some(p) = out.positions[i] {
                if !p.is_finite() {
                    out.positions[i] = None;
                    out.confidences[i] = None;
                    continue;
                }
            }
            out.confidences[i] = match out.confidences[i] {
                Some(c) if c.is_finite() => Some(c.clamp(0.0, 1.0)),
                _ => None,
            };
        }
        out
    }
}
