fn main() {
    #[cfg(feature = "cli")]
    rbd_diff_apply::cli::run();

    #[cfg(not(feature = "cli"))]
    {
        eprintln!("rbd-diff-apply: CLI not enabled. Rebuild with `--features cli`.");
        std::process::exit(1);
    }
}
