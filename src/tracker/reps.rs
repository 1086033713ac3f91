use std::collections::HashMap;

use serde::Serialize;

use crate::config::{Config, RepConfig};
use crate::tracker::analyzer::FormAnalysisResult;
use crate::tracker::phase::SquatPhase;
use crate::tracker::scoring::CoachingCue;
use crate::tracker::side::BodySide;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RepKind {
    /// しゃがみ位置まで到達した
    Full,
    /// 下降したがしゃがみ位置に届かなかった
    Partial,
}

/// 確定した1レップ
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CompletedRep {
    /// 種別ごとの通し番号（1始まり）
    pub number: u32,
    pub kind: RepKind,
    pub quality: u32,
    pub cues: Vec<CoachingCue>,
    /// 平均に使ったフレーム数
    pub scored_frames: usize,
}

/// 進行中の試行の蓄積
#[derive(Debug, Clone, Default)]
struct RepetitionRecord {
    scores: Vec<u32>,
    cues: Vec<Vec<CoachingCue>>,
    /// 下降を確認した
    attempted_movement: bool,
    reached_depth: bool,
}

impl RepetitionRecord {
    fn push(&mut self, quality: u32, cues: &[CoachingCue]) {
        self.scores.push(quality);
        self.cues.push(cues.to_vec());
    }

    /// フレームスコアの整数平均
    fn mean_quality(&self) -> u32 {
        if self.scores.is_empty() {
            return 0;
        }
        let sum: u64 = self.scores.iter().map(|&s| s as u64).sum();
        (sum / self.scores.len() as u64) as u32
    }

    /// `fraction` を超える割合のフレームに出たキューを頻度順に最大 `limit` 個
    fn dominant_cues(&self, fraction: f32, limit: usize) -> Vec<CoachingCue> {
        let frames = self.cues.len();
        let mut counts: HashMap<CoachingCue, usize> = HashMap::new();
        let mut order = Vec::new();
        for cue in self.cues.iter().flatten() {
            let count = counts.entry(*cue).or_insert(0);
            if *count == 0 {
                order.push(*cue);
            }
            *count += 1;
        }

        let min_count = frames as f32 * fraction;
        let mut dominant: Vec<(CoachingCue, usize)> = order
            .into_iter()
            .map(|cue| (cue, counts[&cue]))
            .filter(|&(_, count)| count as f32 > min_count)
            .collect();
        // 同数は初出順（安定ソート）
        dominant.sort_by(|a, b| b.1.cmp(&a.1));
        dominant.truncate(limit);
        dominant.into_iter().map(|(cue, _)| cue).collect()
    }
}

/// ホストに渡すセッション集計
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionAggregate {
    pub full_reps: u32,
    pub partial_reps: u32,
    /// フルレップのみの平均
    pub average_quality: u32,
    /// 部分レップも含めた平均
    pub average_quality_with_partials: u32,
    pub last_rep_quality: Option<u32>,
    pub last_rep_cues: Vec<CoachingCue>,
}

impl SessionAggregate {
    pub fn total_attempts(&self) -> u32 {
        self.full_reps + self.partial_reps
    }
}

/// セット中のフォーム推移
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PerformanceTrend {
    Improved,
    Declined,
    Consistent,
}

/// セッション終了時のまとめ
#[derive(Debug, Clone, PartialEq, Default, Serialize)]
pub struct SessionSummary {
    /// 部分レップを含む
    pub total_reps: u32,
    pub full_reps: u32,
    pub partial_reps: u32,
    pub average_score: u32,
    pub highest_score: u32,
    pub lowest_score: u32,
    pub rep_scores: Vec<u32>,
    pub good_form_percentage: f32,
    pub most_common_issue: Option<CoachingCue>,
    /// most_common_issue が出たフレーム数
    pub issue_count: u32,
    /// 後半平均 - 前半平均（4レップ未満は 0）
    pub performance_trend: f32,
}

impl SessionSummary {
    /// 4レップ以上で ±2 点を超える変化があれば改善/低下
    pub fn trend(&self) -> Option<PerformanceTrend> {
        if self.total_reps < 4 {
            return None;
        }
        Some(if self.performance_trend > 2.0 {
            PerformanceTrend::Improved
        } else if self.performance_trend < -2.0 {
            PerformanceTrend::Declined
        } else {
            PerformanceTrend::Consistent
        })
    }
}

/// 確定フェーズの列からレップを切り出して集計する
pub struct RepAggregator {
    config: RepConfig,
    last_phase: SquatPhase,
    record: RepetitionRecord,
    history: Vec<CompletedRep>,
    full_reps: u32,
    partial_reps: u32,
    full_quality_sum: u64,
    total_quality_sum: u64,
    /// セッション中の全フレームのキュー出現数（初出順）
    cue_frequency: Vec<(CoachingCue, u32)>,
}

impl RepAggregator {
    pub fn new(config: &RepConfig) -> Self {
        Self {
            config: config.clone(),
            last_phase: SquatPhase::Standing,
            record: RepetitionRecord::default(),
            history: Vec::new(),
            full_reps: 0,
            partial_reps: 0,
            full_quality_sum: 0,
            total_quality_sum: 0,
            cue_frequency: Vec::new(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        Self::new(&config.reps)
    }

    pub fn history(&self) -> &[CompletedRep] {
        &self.history
    }

    /// 1フレームの解析結果を取り込む。レップが確定したらそれを返す
    pub fn update(&mut self, result: &FormAnalysisResult) -> Option<CompletedRep> {
        let previous = self.last_phase;
        let phase = result.phase;
        self.last_phase = phase;

        for cue in &result.cues {
            match self.cue_frequency.iter_mut().find(|(c, _)| c == cue) {
                Some((_, count)) => *count += 1,
                None => self.cue_frequency.push((*cue, 1)),
            }
        }

        if previous == SquatPhase::Standing && phase != SquatPhase::Standing {
            self.record = RepetitionRecord::default();
        }

        // 下降を経ずに立位へ戻った場合は試行に数えない
        match phase {
            SquatPhase::Descending => self.record.attempted_movement = true,
            SquatPhase::InSquat => {
                self.record.reached_depth = true;
                if result.side != BodySide::Undetermined {
                    if let Some(quality) = result.quality {
                        self.record.push(quality, &result.cues);
                    }
                }
            }
            _ => {}
        }

        if previous != SquatPhase::Standing && phase == SquatPhase::Standing {
            return self.close();
        }
        None
    }

    fn close(&mut self) -> Option<CompletedRep> {
        let record = std::mem::take(&mut self.record);

        let rep = if record.reached_depth {
            self.full_reps += 1;
            let quality = record.mean_quality();
            self.full_quality_sum += quality as u64;
            CompletedRep {
                number: self.full_reps,
                kind: RepKind::Full,
                quality,
                cues: record
                    .dominant_cues(self.config.dominant_cue_fraction, self.config.max_rep_cues),
                scored_frames: record.scores.len(),
            }
        } else if record.attempted_movement {
            self.partial_reps += 1;
            CompletedRep {
                number: self.partial_reps,
                kind: RepKind::Partial,
                quality: self.config.partial_rep_score,
                cues: vec![CoachingCue::GoDeeper],
                scored_frames: 0,
            }
        } else {
            return None;
        };

        self.total_quality_sum += rep.quality as u64;
        tracing::info!(
            kind = ?rep.kind,
            number = rep.number,
            quality = rep.quality,
            frames = rep.scored_frames,
            cues = ?rep.cues,
            "repetition completed"
        );
        self.history.push(rep.clone());
        Some(rep)
    }

    pub fn aggregate(&self) -> SessionAggregate {
        let last = self.history.last();
        SessionAggregate {
            full_reps: self.full_reps,
            partial_reps: self.partial_reps,
            average_quality: mean(self.full_quality_sum, self.full_reps),
            average_quality_with_partials: mean(
                self.total_quality_sum,
                self.full_reps + self.partial_reps,
            ),
            last_rep_quality: last.map(|rep| rep.quality),
            last_rep_cues: last.map(|rep| rep.cues.clone()).unwrap_or_default(),
        }
    }

    pub fn summary(&self) -> SessionSummary {
        let scores: Vec<u32> = self.history.iter().map(|rep| rep.quality).collect();
        if scores.is_empty() {
            return SessionSummary::default();
        }
        let total = scores.len() as u32;
        let sum: u64 = scores.iter().map(|&s| s as u64).sum();
        let good = scores
            .iter()
            .filter(|&&s| s >= self.config.good_form_score)
            .count();

        // 同数なら先に出たもの
        let mut most_common: Option<(CoachingCue, u32)> = None;
        for &(cue, count) in &self.cue_frequency {
            if most_common.map_or(true, |(_, best)| count > best) {
                most_common = Some((cue, count));
            }
        }

        let performance_trend = if scores.len() >= 4 {
            let half = scores.len() / 2;
            let avg = |s: &[u32]| s.iter().sum::<u32>() as f32 / s.len() as f32;
            avg(&scores[half..]) - avg(&scores[..half])
        } else {
            0.0
        };

        SessionSummary {
            total_reps: total,
            full_reps: self.full_reps,
            partial_reps: self.partial_reps,
            average_score: (sum / total as u64) as u32,
            highest_score: scores.iter().copied().max().unwrap_or(0),
            lowest_score: scores.iter().copied().min().unwrap_or(0),
            good_form_percentage: good as f32 / total as f32 * 100.0,
            most_common_issue: most_common.map(|(cue, _)| cue),
            issue_count: most_common.map_or(0, |(_, count)| count),
            performance_trend,
            rep_scores: scores,
        }
    }

    /// 途中の試行は記録せずに捨てる
    pub fn reset(&mut self) {
        *self = Self::new(&self.config);
    }
}

fn mean(sum: u64, count: u32) -> u32 {
    if count == 0 {
        0
    } else {
        (sum / count as u64) as u32
    }
}
