use clap::Parser;

use aspect_weaver::error::NiceError;
use aspect_weaver::{main_weave, Opt};
use weaver_pipeline::CancellationToken;

fn main() {
    let opt = Opt::parse();
    opt.logger.enable_log();

    let cancellation = CancellationToken::new();
    let token = cancellation.clone();
    if let Err(e) = ctrlc::set_handler(move || {
        log::warn!("Stopping at the next step");
        token.cancel();
    }) {
        log::warn!("Cannot bind control-C handler: {:?}", e);
    }

    let project = opt.project.clone();
    let success = main_weave(opt, cancellation)
        .nice_expect_with(|| format!("Cannot weave {}", project.display()));
    if !success {
        std::process::exit(1);
    }
}
