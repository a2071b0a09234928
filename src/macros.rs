macro_rules! fatal {
    ($($arg:tt)+) => {{
        let msg = format!($($arg)+);
        log::error!("{}", msg);
        eprintln!("{}", msg);
        std::process::exit(1);
    }};
}
