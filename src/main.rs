fn main() {
    if let Err(err) = drainlab_lib::run_cli() {
        eprintln!("drainlab: {err:#}");
        std::process::exit(1);
    }
}
