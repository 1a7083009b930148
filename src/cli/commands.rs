use std::path::PathBuf;
use std::sync::Arc;

use tokio::sync::broadcast::error::RecvError;
use tracing::debug;
use url::Url;

use crate::app::{AppContext, Result};
use crate::controller::CollectorEvent;
use crate::domain::HarvestReport;
use crate::page::ChromePage;
use crate::store::ResultStore;

pub async fn collect(
    ctx: &AppContext,
    url: &str,
    target: usize,
    out: Option<PathBuf>,
    headed: bool,
) -> Result<()> {
    Url::parse(url)?;

    let mut browser = ctx.config.browser.clone();
    if headed {
        browser.headless = false;
    }

    println!("Opening {}...", url);
    let page = Arc::new(ChromePage::open(url, browser).await?);
    let mut controller = ctx.controller(page.clone());
    let mut events = controller.subscribe();

    let group = controller.group_info().await;
    match group.member_count {
        Some(members) => println!("Group: {} ({} members)", group.name, members),
        None => println!("Group: {}", group.name),
    }

    controller.start(target).await?;
    println!("Collecting {} posts (Ctrl-C to stop early)", target);

    let report = loop {
        tokio::select! {
            event = events.recv() => match event {
                Ok(CollectorEvent::Progress { current, target }) => {
                    println!("  {}/{} posts", current, target);
                }
                Ok(CollectorEvent::Stalled { consecutive }) => {
                    println!("  No new posts after {} attempts, still trying...", consecutive);
                }
                Ok(CollectorEvent::Complete(report)) => break Some(report.as_ref().clone()),
                Err(RecvError::Lagged(skipped)) => {
                    debug!("Skipped {} progress events", skipped);
                }
                Err(RecvError::Closed) => break controller.stop().await,
            },
            _ = tokio::signal::ctrl_c() => {
                println!("Stopping...");
                match controller.stop().await {
                    Some(partial) => break Some(partial),
                    // The run finished while we were stopping it
                    None => break ctx.store.load_result()?,
                }
            }
        }
    };

    // Releases the finished run's background tasks
    controller.stop().await;
    drop(controller);

    match report {
        Some(report) => write_report(ctx, &report, out)?,
        None => println!("Nothing collected"),
    }

    match Arc::try_unwrap(page) {
        Ok(page) => page.close().await?,
        Err(_) => debug!("Browser still referenced; it shuts down on exit"),
    }
    Ok(())
}

pub fn export(ctx: &AppContext, partial: bool, out: Option<PathBuf>) -> Result<()> {
    let report = if partial {
        ctx.store.load_partial()?
    } else {
        ctx.store.load_result()?
    };

    match report {
        Some(report) => write_report(ctx, &report, out),
        None => {
            println!(
                "No {} result stored",
                if partial { "partial" } else { "completed" }
            );
            Ok(())
        }
    }
}

pub fn status(ctx: &AppContext, limit: usize) -> Result<()> {
    match ctx.store.load_run_state()? {
        Some(state) => {
            let phase = match (state.is_collecting, state.is_paused) {
                (true, true) => "paused",
                (true, false) => "collecting",
                _ => "idle",
            };
            println!(
                "Last run: {} ({}/{} posts, updated {})",
                phase,
                state.current_count,
                state.target_count,
                state.last_updated.format("%Y-%m-%d %H:%M:%S")
            );
        }
        None => println!("No run recorded"),
    }

    let runs = ctx.store.recent_runs(limit)?;
    if runs.is_empty() {
        return Ok(());
    }

    println!();
    println!("{:<20} {:>6}  {:<9} {}", "Collected", "Posts", "Result", "Group");
    println!("{}", "-".repeat(60));
    for run in runs {
        println!(
            "{:<20} {:>6}  {:<9} {}",
            run.collected_at.format("%Y-%m-%d %H:%M"),
            run.item_count,
            if run.is_complete { "complete" } else { "partial" },
            run.group_name
        );
    }
    Ok(())
}

fn write_report(ctx: &AppContext, report: &HarvestReport, out: Option<PathBuf>) -> Result<()> {
    let paths = ctx.exporter(out).write(report)?;
    println!(
        "Saved {} posts{}",
        report.total_collected,
        if report.partial_data { " (partial)" } else { "" }
    );
    for path in paths {
        println!("  {}", path.display());
    }
    Ok(())
}
