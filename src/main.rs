fn main() {
    std::process::exit(typebridge::run_cli());
}
