use std::sync::Arc;

use anyhow::{bail, Context};
use auto_cinema::{
    GatewayClient, GatewayConfig, PipelineConfig, Resolution, RunController, RunSnapshot,
    SceneOp, VideoConfig, VideoModel,
};
use clap::Parser;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "auto-cinema")]
#[command(
    about = "Turn a short premise into consistent storyboard frames and clips",
    long_about = None
)]
struct Args {
    /// Story premise
    #[arg(short, long)]
    topic: Option<String>,

    /// Read the premise from a text file
    #[arg(short, long)]
    file: Option<String>,

    /// Custom asset as NAME=IMAGE_URL, analyzed before the run (repeatable)
    #[arg(short, long = "asset", value_name = "NAME=URL")]
    assets: Vec<String>,

    /// Do not feed the previous frame into the next scene
    #[arg(long)]
    no_consistency: bool,

    /// Generate a video clip for every scene
    #[arg(long)]
    videos: bool,

    /// Video model (sora-2, wan-2.2, veo3-fast, kling-2.1)
    #[arg(long, default_value = "veo3-fast")]
    video_model: String,

    /// Video resolution for parameter-based models
    #[arg(long, default_value = "720p")]
    resolution: String,

    /// Video duration in seconds for parameter-based models
    #[arg(long, default_value_t = 8)]
    duration: u32,

    /// Regenerate these scenes after the run (repeatable)
    #[arg(long = "regenerate", value_name = "SCENE_ID")]
    regenerate: Vec<u32>,

    /// Write a JSON snapshot of the run to this path
    #[arg(long)]
    report: Option<String>,

    /// Gateway base URL
    #[arg(long, env = "CINEMA_BASE_URL")]
    base_url: Option<String>,

    /// Gateway API key
    #[arg(long, env = "CINEMA_API_KEY", hide_env_values = true)]
    api_key: Option<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 加载环境变量
    dotenvy::dotenv().ok();

    // 初始化日志
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(false)
        .with_thread_ids(false)
        .with_level(true)
        .init();

    let args = Args::parse();

    // 获取故事梗概
    let topic = if let Some(text) = args.topic.clone() {
        text
    } else if let Some(file_path) = &args.file {
        tokio::fs::read_to_string(file_path)
            .await
            .with_context(|| format!("Failed to read file: {}", file_path))?
    } else {
        bail!("Either --topic or --file must be provided");
    };

    let controller = Arc::new(build_controller(&args)?);

    for entry in &args.assets {
        let (name, url) = entry
            .split_once('=')
            .with_context(|| format!("Invalid --asset value (expected NAME=URL): {}", entry))?;
        match controller.upload_asset(name.trim(), url.trim()).await {
            Ok(id) => info!("Registered asset {} as {}", name, id),
            Err(e) => warn!("Asset {} stays pending: {}", name, e),
        }
    }

    info!("Starting storyboard run...");
    let snapshot = controller.run(topic.trim()).await?;
    print_summary(&snapshot);

    // 并发重绘，同一分镜重复请求会被忽略
    let handles: Vec<_> = args
        .regenerate
        .iter()
        .map(|&scene_id| {
            let controller = Arc::clone(&controller);
            tokio::spawn(async move { (scene_id, controller.regenerate_scene(scene_id).await) })
        })
        .collect();
    for handle in handles {
        match handle.await? {
            (id, Ok(SceneOp::Finished(frame))) => info!("Scene {} regenerated: {}", id, frame.url),
            (id, Ok(SceneOp::AlreadyRunning)) => info!("Scene {} already regenerating", id),
            (id, Err(e)) => error!("Scene {} regeneration rejected: {}", id, e),
        }
    }

    if let Some(path) = &args.report {
        let json = serde_json::to_string_pretty(&controller.snapshot())?;
        tokio::fs::write(path, json)
            .await
            .with_context(|| format!("Failed to write report: {}", path))?;
        info!("Report written to {}", path);
    }

    Ok(())
}

fn build_controller(args: &Args) -> anyhow::Result<RunController> {
    let mut gateway = GatewayConfig::from_env();
    if let Some(base_url) = &args.base_url {
        gateway.base_url = base_url.clone();
    }
    if let Some(key) = args.api_key.as_ref().filter(|k| !k.is_empty()) {
        gateway.api_key = Some(key.clone());
    }
    let client = GatewayClient::new(gateway).context("Failed to create HTTP client")?;

    let model: VideoModel = args.video_model.parse()?;
    let resolution: Resolution = args.resolution.parse()?;
    let config = PipelineConfig {
        consistency: !args.no_consistency,
        generate_videos: args.videos,
        video: VideoConfig {
            model,
            resolution: Some(resolution),
            duration_secs: Some(args.duration),
        },
    };

    Ok(RunController::new(Arc::new(client), config)?)
}

fn print_summary(snapshot: &RunSnapshot) {
    if let Some(script) = &snapshot.script {
        println!("《{}》", script.title);
        for scene in &script.scenes {
            let frame = snapshot
                .frames
                .get(&scene.id)
                .map(|f| format!("{} ({:?})", f.url, f.origin))
                .unwrap_or_else(|| "-".to_string());
            println!("  #{} [{}] {}", scene.id, scene.shot_type, scene.desc);
            println!("      frame: {}", frame);
            if let Some(clip) = snapshot.clips.get(&scene.id) {
                println!("      clip:  {}", clip.url);
            }
        }
    }
    println!();
    for line in &snapshot.log {
        println!("{}", line);
    }
}
