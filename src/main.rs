use chrono::Local;
use std::io::IsTerminal;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};

use feed_scout::cli::{self, NoPrompt, Prompter, StdinPrompter};
use feed_scout::features::{FileReportSink, ReportWriter, ScrollController, SessionState};
use feed_scout::scraping::{CdpOptions, CdpSnapshotSource};
use feed_scout::load_scout_config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Logs go to stderr; stdout is for prompts and the final report path.
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info,chromiumoxide=warn"));
    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_writer(std::io::stderr)
        .init();

    let args = cli::parse_args(std::env::args().skip(1))?;
    if args.help {
        print!("{}", cli::USAGE);
        return Ok(());
    }
    if args.version {
        println!("feed-scout {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    let cfg = load_scout_config();
    let interactive = !args.no_prompt && std::io::stdin().is_terminal();
    let mut prompter: Box<dyn Prompter> = if interactive {
        Box::new(StdinPrompter)
    } else {
        Box::new(NoPrompt)
    };
    let options = cli::resolve_run_options(&args, &cfg, prompter.as_mut());

    let mut cdp = CdpOptions::from_config(&cfg);
    if let Some(endpoint) = &args.endpoint {
        cdp.endpoint = endpoint.trim().trim_end_matches('/').to_string();
    }
    cdp.tab_hint = args.tab.clone();

    info!("connecting to the browser at {}", cdp.endpoint);
    let mut source = CdpSnapshotSource::attach(cdp).await?;

    let stop = Arc::new(AtomicBool::new(false));
    {
        let stop = Arc::clone(&stop);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, finishing the current pass");
                stop.store(true, Ordering::SeqCst);
            }
        });
    }

    let reports_dir = args
        .reports_dir
        .clone()
        .unwrap_or_else(|| cfg.resolve_reports_dir());
    let mut sink = FileReportSink::new(ReportWriter::new(reports_dir, args.json), Local::now());
    let mut session = SessionState::new(&options);

    let result = ScrollController::new(&mut source, options)
        .with_stop_flag(stop)
        .with_base_url(cfg.resolve_base_url())
        .run_with_sink(&mut session, &mut sink)
        .await;
    source.detach();

    match sink.outcome.take() {
        Some(Ok(paths)) => {
            println!("{}", paths.html.display());
            if let Some(json) = paths.json {
                println!("{}", json.display());
            }
        }
        Some(Err(e)) => error!("could not write report: {}", e),
        None => {}
    }

    let summary = result?;
    info!(
        "done: {} posts in {} steps ({})",
        summary.total_records,
        summary.steps,
        summary.stop_reason.describe()
    );
    Ok(())
}
