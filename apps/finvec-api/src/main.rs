use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = finvec_api::Args::parse();

	finvec_api::run(args).await
}
