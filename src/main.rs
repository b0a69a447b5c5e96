fn main() {
    if let Err(err) = mtss_explorer::run() {
        eprintln!("error: {err:#}");
        std::process::exit(1);
    }
}
