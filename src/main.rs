use anyhow::{bail, Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use squat_coach::config::Config;
use squat_coach::pose::mock::CYCLE_FRAMES;
use squat_coach::pose::{JointObservation, MockForm, MockSquatGenerator};
use squat_coach::tracker::{FrameReport, PerformanceTrend, RepKind, SquatAnalyzer};

const CONFIG_PATH: &str = "squat_coach.toml";

enum Source {
    Replay(PathBuf),
    Mock { form: MockForm, reps: usize },
}

struct Args {
    config: PathBuf,
    source: Source,
}

// Usage: squat_coach [--config PATH] [--replay FILE.jsonl] [--mock good|chest|shallow] [--reps N]
fn parse_args() -> Result<Args> {
    let mut config = PathBuf::from(CONFIG_PATH);
    let mut replay = None;
    let mut form = MockForm::Good;
    let mut reps = 5;

    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        let mut value = || {
            args.next()
                .with_context(|| format!("{} requires a value", arg))
        };
        match arg.as_str() {
            "--config" => config = PathBuf::from(value()?),
            "--replay" => replay = Some(PathBuf::from(value()?)),
            "--mock" => form = value()?.parse()?,
            "--reps" => {
                reps = value()?
                    .parse()
                    .context("--reps must be a non-negative integer")?
            }
            other => bail!("unknown argument: {}", other),
        }
    }

    let source = match replay {
        Some(path) => Source::Replay(path),
        None => Source::Mock { form, reps },
    };
    Ok(Args { config, source })
}

fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_target(false))
        .init();

    let args = parse_args()?;
    let config = Config::load_or_default(&args.config);

    println!("=== Squat Coach ===");
    println!("プロファイル: {:?}", config.profile);
    println!(
        "膝角度: {}〜{}° / 背中: {}° 以内 / 信頼度閾値: {}",
        config.scoring.knee_angle_min,
        config.scoring.knee_angle_max,
        config.scoring.back_angle_max,
        config.detection.confidence_threshold
    );
    println!();

    let mut analyzer = SquatAnalyzer::new(&config);

    match args.source {
        Source::Replay(path) => {
            println!("再生: {}", path.display());
            let frames = replay(&path, &mut analyzer)?;
            println!("  {} フレーム処理", frames);
        }
        Source::Mock { form, reps } => {
            println!("モック: {:?} x {}", form, reps);
            let mut generator = MockSquatGenerator::new(form);
            for _ in 0..reps * CYCLE_FRAMES {
                let report = analyzer.process(&generator.next_frame());
                print_report(&report);
            }
        }
    }

    print_summary(&analyzer);
    Ok(())
}

/// 1行1観測の JSON Lines を順に流す
fn replay(path: &Path, analyzer: &mut SquatAnalyzer) -> Result<usize> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut frames = 0;
    for (i, line) in BufReader::new(file).lines().enumerate() {
        let line = line.with_context(|| format!("Failed to read {}", path.display()))?;
        if line.trim().is_empty() {
            continue;
        }
        let obs: JointObservation = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: invalid observation", path.display(), i + 1))?;
        let report = analyzer.process(&obs);
        print_report(&report);
        frames += 1;
    }
    Ok(frames)
}

fn print_report(report: &FrameReport) {
    if report.phase_changed {
        tracing::debug!(phase = %report.analysis.phase, "phase");
    }
    let Some(rep) = &report.completed_rep else {
        return;
    };
    let cues: Vec<&str> = rep.cues.iter().map(|c| c.as_str()).collect();
    match rep.kind {
        RepKind::Full => println!(
            "[rep {}] スコア {} ({} フレーム) {}",
            rep.number,
            rep.quality,
            rep.scored_frames,
            cues.join(", ")
        ),
        RepKind::Partial => println!(
            "[partial {}] しゃがみ不足 スコア {} {}",
            rep.number,
            rep.quality,
            cues.join(", ")
        ),
    }
}

fn print_summary(analyzer: &SquatAnalyzer) {
    let aggregate = analyzer.aggregate();
    let summary = analyzer.summary();

    println!();
    println!("=== セッション結果 ===");
    println!(
        "レップ: {} (フル {} / 部分 {})",
        aggregate.total_attempts(),
        aggregate.full_reps,
        aggregate.partial_reps
    );
    if summary.total_reps == 0 {
        println!("レップが検出されませんでした");
        return;
    }
    println!(
        "平均スコア: {} (部分含む {})",
        aggregate.average_quality, aggregate.average_quality_with_partials
    );
    println!("最高 / 最低: {} / {}", summary.highest_score, summary.lowest_score);
    println!("良いフォーム: {:.0}%", summary.good_form_percentage);
    match summary.most_common_issue {
        Some(cue) => println!("多かった指摘: {} ({} フレーム)", cue, summary.issue_count),
        None => println!("目立った指摘なし"),
    }
    match summary.trend() {
        Some(PerformanceTrend::Improved) => println!("推移: 改善 ({:+.1})", summary.performance_trend),
        Some(PerformanceTrend::Declined) => println!("推移: 低下 ({:+.1})", summary.performance_trend),
        Some(PerformanceTrend::Consistent) => println!("推移: 安定"),
        None => {}
    }
    if let Some(baseline) = analyzer.calibration_baseline() {
        println!("基準距離 (腰〜足首): {:.1}", baseline);
    }
}
