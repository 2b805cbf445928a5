use clap::Parser;

use finvec_worker::Args;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	finvec_worker::run(Args::parse()).await
}
