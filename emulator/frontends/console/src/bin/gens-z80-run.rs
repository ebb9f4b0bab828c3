use std::process;

fn main() {
    let matches = gens_console::args("Z80 Program Runner").get_matches();

    if let Err(err) = gens_console::start(matches) {
        gens_console::report_error(&err);
        process::exit(1);
    }
}
