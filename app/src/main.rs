use clap::Parser;

fn main() -> anyhow::Result<()> {
    let cli = sbpanel::cli::Cli::parse();
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?
        .block_on(sbpanel::run(cli))
}
