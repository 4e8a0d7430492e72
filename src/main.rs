use anyhow::{Context, Result};
use collision_skit::core::config::Config;
use collision_skit::core::io::{NativeStorage, Storage};
use collision_skit::services::controller::AnimationController;
use collision_skit::services::speech::{
    create_synthesizer, PreloadPolicy, SpeechCache, SpeechPreloader, SpeechRequest,
};
use collision_skit::ui::TerminalRenderer;
use indicatif::{ProgressBar, ProgressStyle};
use log::{info, warn};
use std::io::Write;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::time::MissedTickBehavior;

const STAGE_COLUMNS: usize = 72;

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();

    // 1. Load config; the script is static, so any error here is fatal.
    let config = match Config::load_or_default() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Error loading config: {:#}", e);
            return Err(e);
        }
    };
    let script = config.script().context("Invalid script in config")?;
    let voices = config.voices();

    // 2. Speech pipeline
    let storage: Arc<dyn Storage> = Arc::new(NativeStorage::new());
    let cache = Arc::new(SpeechCache::new(storage, &config.cache_folder));
    let synthesizer = create_synthesizer(&config.speech)?;
    let preloader = Arc::new(SpeechPreloader::spawn(
        cache,
        synthesizer,
        PreloadPolicy::from(&config.speech),
    ));

    let requests = script.speech_requests(&voices);
    let queued = preloader.schedule(requests.clone());
    info!(
        "{} phases, {} speech lines ({} queued for synthesis)",
        script.len(),
        requests.len(),
        queued
    );

    if config.speech.warm_before_start {
        warm_up(preloader.cache(), &requests).await?;
    }

    // 3. Frame loop
    let mut controller =
        AnimationController::new(script, &config.stage, &config.actors, preloader.clone());
    let renderer = TerminalRenderer::new(STAGE_COLUMNS, config.stage.width);
    let frame = Duration::from_secs_f64(1.0 / config.stage.fps.max(1) as f64);
    let mut interval = tokio::time::interval(frame);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    let mut stdout = std::io::stdout();
    let mut last = Instant::now();
    loop {
        interval.tick().await;
        let now = Instant::now();
        let delta = now
            .duration_since(last)
            .as_secs_f32()
            .min(config.stage.max_frame_seconds);
        last = now;

        let snapshot = controller.tick(delta);
        for cue in &snapshot.audio_cues {
            writeln!(stdout, "\r\x1b[K{}", renderer.cue(cue))?;
        }
        for effect in &snapshot.effects {
            writeln!(stdout, "\r\x1b[K{}", renderer.effect(*effect))?;
        }
        write!(stdout, "\r\x1b[K{}", renderer.render(&snapshot))?;
        stdout.flush()?;
        if snapshot.finished {
            writeln!(stdout)?;
            break;
        }
    }
    info!("Animation took {:.2}s", controller.clock());

    // 4. Let in-flight syntheses reach the durable store.
    drop(controller);
    match Arc::try_unwrap(preloader) {
        Ok(preloader) => preloader.drain().await,
        Err(_) => warn!("Speech preloader still shared, not draining"),
    }

    Ok(())
}

/// Waits until every line is READY or FAILED, showing progress.
async fn warm_up(cache: &SpeechCache, requests: &[SpeechRequest]) -> Result<()> {
    let pb = ProgressBar::new(requests.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} lines")?
            .progress_chars("#>-"),
    );

    loop {
        let resolved = requests
            .iter()
            .filter(|request| {
                cache
                    .lookup(request)
                    .is_some_and(|status| status.is_resolved())
            })
            .count();
        pb.set_position(resolved as u64);
        if resolved == requests.len() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    pb.finish_and_clear();
    info!("Speech cache warmed ({} lines)", requests.len());
    Ok(())
}
