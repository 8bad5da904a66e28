#![recursion_limit = "256"]

use clap::Parser;
use dbir_cli::Cli;
use dbir_process::eval_stream::eval_stream;

fn main() -> Result<(), anyhow::Error> {
    let args = Cli::parse().validate()?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .expect("Failed to initialize tokio runtime");

    runtime.block_on(async move {
        env_logger::builder()
            .target(env_logger::Target::Stdout)
            .init();

        let device = Default::default();
        let stream = eval_stream(args.process, device);
        dbir_cli::eval_ui(stream).await
    })
}
