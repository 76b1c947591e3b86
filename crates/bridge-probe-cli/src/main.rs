//! bridge-probe: run and summarise wallet bridge end-to-end checks

use bridge_probe::{load_results, HarnessConfig};
use bridge_probe_cli::{
    logging, Cli, CliConfig, CliResult, Commands, Reporter, RunArgs, SummaryArgs, SummaryReport,
    Verbosity,
};
use clap::Parser;
use std::path::Path;
use std::process::ExitCode;

fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn run(cli: Cli) -> CliResult<()> {
    let config = CliConfig::new()
        .with_verbosity(Verbosity::from_flags(cli.quiet, cli.verbose))
        .with_color(cli.color.into())
        .with_log_json(cli.log_json);
    logging::init(&config)?;

    let mut reporter = Reporter::new(
        config.color.should_color(),
        config.verbosity.is_quiet(),
    );

    match cli.command {
        Commands::Run(args) => run_operation(cli.config.as_deref(), &args, &mut reporter),
        Commands::Summary(args) => run_summary(&args, &reporter),
        Commands::CheckConfig => run_check_config(cli.config.as_deref(), &reporter),
    }
}

#[cfg(not(feature = "browser"))]
fn run_operation(_config: Option<&Path>, _args: &RunArgs, _reporter: &mut Reporter) -> CliResult<()> {
    Err(bridge_probe_cli::CliError::unsupported(
        "browser support is not compiled in; rebuild with --features browser",
    ))
}

#[cfg(feature = "browser")]
fn run_operation(config_path: Option<&Path>, args: &RunArgs, reporter: &mut Reporter) -> CliResult<()> {
    use bridge_probe::{har, ResultWriter};
    use bridge_probe_cli::CliError;

    let config = HarnessConfig::load(config_path)?;
    let options = live::browser_options(args)?;
    let request = live::bridge_request(args);
    let writer = ResultWriter::from_config(&config);

    reporter.header(&format!("Bridge operation {}", writer.task_id()));
    reporter.info(&format!(
        "{} {} on {} -> {} on {}",
        request.amount, request.from_token, request.from_chain, request.to_token, request.to_chain
    ));

    let rt = tokio::runtime::Runtime::new()?;
    reporter.start_spinner("driving the bridge UI");
    let outcome = rt.block_on(live::drive(config, options, request));
    reporter.finish_spinner();
    let (result, events) = outcome?;

    let path = writer.write_result(&result)?;
    reporter.info(&format!("result written to {}", path.display()));
    if args.har {
        let har_path = writer.write_har(&har::export(&events), chrono::Utc::now())?;
        reporter.info(&format!("traffic written to {}", har_path.display()));
    }
    reporter.operation(&result);

    if result.success {
        Ok(())
    } else {
        Err(CliError::OperationFailed {
            message: result
                .error
                .unwrap_or_else(|| "operation did not succeed".to_string()),
        })
    }
}

#[cfg(feature = "browser")]
mod live {
    use bridge_probe::{
        BridgeOperationResult, BridgePipeline, BridgeRequest, BrowserOptions, Capability,
        CapturedEvent, CdpPage, HarnessConfig, MonitorRegistry,
    };
    use bridge_probe_cli::{CliResult, RunArgs};
    use std::collections::BTreeMap;

    pub fn bridge_request(args: &RunArgs) -> BridgeRequest {
        let request = BridgeRequest::new(
            args.amount.clone(),
            args.from_chain.clone(),
            args.from_token.clone(),
            args.to_chain.clone(),
            args.to_token.clone(),
            args.route_type.clone(),
        );
        match &args.target_address {
            Some(address) => request.with_target_address(address.clone()),
            None => request,
        }
    }

    pub fn browser_options(args: &RunArgs) -> CliResult<BrowserOptions> {
        let selectors: BTreeMap<Capability, String> = match &args.selectors {
            Some(path) => serde_yaml_ng::from_str(&std::fs::read_to_string(path)?)?,
            None => BTreeMap::new(),
        };
        Ok(BrowserOptions {
            headless: !args.headed,
            sandbox: !args.no_sandbox,
            chromium_path: args.chromium.clone(),
            user_data_dir: args.user_data_dir.clone(),
            extensions: args.extensions.clone(),
            selectors,
        })
    }

    /// Launch, run the pipeline, close. Returns the result and every captured event.
    pub async fn drive(
        config: HarnessConfig,
        options: BrowserOptions,
        request: BridgeRequest,
    ) -> CliResult<(BridgeOperationResult, Vec<CapturedEvent>)> {
        let registry = MonitorRegistry::new(config.registry_config());
        let page = CdpPage::launch(options, registry.recorder()).await?;
        let mut pipeline = BridgePipeline::new(config, registry, page);
        let result = pipeline.perform_bridge_operation(request).await;

        let (page, registry) = pipeline.into_parts();
        let events = registry.recorder().events();
        if let Err(e) = page.close().await {
            tracing::warn!(error = %e, "browser did not close cleanly");
        }
        Ok((result, events))
    }
}

fn run_summary(args: &SummaryArgs, reporter: &Reporter) -> CliResult<()> {
    let results = load_results(&args.results_dir)?;
    let report = SummaryReport::new(&results);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if results.is_empty() {
        reporter.warning(&format!(
            "no result files in {}",
            args.results_dir.display()
        ));
    } else {
        for line in report.table_lines() {
            println!("{line}");
        }
    }
    reporter.totals(&report.summary);
    Ok(())
}

fn run_check_config(config_path: Option<&Path>, reporter: &Reporter) -> CliResult<()> {
    let config = HarnessConfig::load(config_path)?;
    print!("{}", config.to_yaml()?);
    reporter.success("configuration is valid");
    Ok(())
}
