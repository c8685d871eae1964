pub fn main() {
    std::process::exit(sqlseed::run_with_args(std::env::args_os()));
}
