use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use lane_steering::{Config, Pipeline, VideoSource};

#[derive(Parser, Debug)]
#[command(name = "lane_steering", about = "Lane detection and steering estimation")]
struct Cli {
    /// YAML 설정 파일 (없으면 기본값 사용)
    #[arg(short, long, default_value = "config.yaml")]
    config: PathBuf,

    /// 동영상 파일 경로 또는 카메라 번호 (설정값 대신 사용)
    #[arg(short, long)]
    source: Option<String>,

    /// 결과 영상 저장 경로
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// 처리할 최대 프레임 수
    #[arg(long)]
    max_frames: Option<u64>,
}

fn load_config(path: &Path) -> Result<Config> {
    if path.exists() {
        Config::load(path).with_context(|| format!("failed to load {}", path.display()))
    } else {
        Ok(Config::default())
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(&cli.config)?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.logging.level.as_str()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    if !cli.config.exists() {
        warn!("{} not found, using default configuration", cli.config.display());
    }

    let source: VideoSource = cli
        .source
        .as_deref()
        .unwrap_or(config.video.source.as_str())
        .parse()?;
    let output = cli.output.clone().or_else(|| config.video.output.as_ref().map(PathBuf::from));
    let max_frames = cli.max_frames.or(config.video.max_frames);

    // 파이프라인 생성
    let mut drive = Pipeline::new(config)?;
    let stats = drive.start_detection(&source, output.as_deref(), max_frames)?;

    info!("=== Run Summary ===");
    info!("Total frames: {}", stats.total_frames);
    info!("Skipped frames: {}", stats.skipped_frames);
    info!("Frames with turn estimate: {}", stats.frames_with_turn);
    info!("Left lane misses: {}", stats.left_misses);
    info!("Right lane misses: {}", stats.right_misses);
    info!("Average FPS: {:.1}", stats.avg_fps);

    Ok(())
}
