use clap::Parser;
use surfwright_cli::cli::Cli;
use surfwright_cli::{commands, logging, output};

#[tokio::main]
async fn main() {
	let cli = Cli::parse();
	logging::init_logging(cli.verbose);
	let pretty = cli.pretty;

	match commands::dispatch(cli).await {
		Ok(Some(report)) => output::print_success(report, pretty),
		// Output was already streamed (network-tail).
		Ok(None) => {}
		Err(err) => {
			output::print_failure(&err, pretty);
			std::process::exit(1);
		}
	}
}
