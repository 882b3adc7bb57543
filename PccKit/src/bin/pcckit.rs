fn main() -> anyhow::Result<()> {
    pcckit::cli::run_cli()
}
