use clap::Parser;

#[tokio::main]
async fn main() -> color_eyre::Result<()> {
	color_eyre::install()?;

	let args = kbr_api::Args::parse();

	kbr_api::run(args).await
}
