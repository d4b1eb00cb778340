use std::ffi::OsString;

fn main() {
    let args: Vec<OsString> = std::env::args_os().collect();
    if let Err(err) = daybook_core::run(args) {
        eprintln!("{}", daybook_core::error_message(&err));
        std::process::exit(1);
    }
}
