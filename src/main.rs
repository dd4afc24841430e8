fn main() {
    if let Err(err) = gfs_vintages::run() {
        eprintln!("error: {err}");
        std::process::exit(1);
    }
}
