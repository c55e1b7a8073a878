fn main() {
    if let Err(err) = efficiency_recon::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
