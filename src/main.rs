fn main() {
    let args: Vec<String> = std::env::args().collect();
    if args.len() > 1 && (args[1] == "--version" || args[1] == "-V") {
        println!("youyou {}", env!("CARGO_PKG_VERSION"));
        return;
    }

    std::process::exit(youyou_lib::run())
}
