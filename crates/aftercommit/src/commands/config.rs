use aftercommit_config::Settings;

pub(super) fn run(settings: &Settings) {
    print!("{}", render(settings));
}

fn render(settings: &Settings) -> String {
    let source = settings.source_path().map_or_else(
        || String::from("defaults (no aftercommit.toml found)"),
        |path| path.display().to_string(),
    );
    let pool = settings.pool();

    let mut out = format!("settings: {source}\n");
    out.push_str(&format!("pool.workers = {}\n", pool.workers()));
    out.push_str(&format!("pool.queue-capacity = {}\n", pool.queue_capacity()));
    out.push_str(&format!("pool.saturation = {}\n", pool.saturation()));
    out.push_str(&format!("pool.thread-name = {}\n", pool.thread_name()));
    out.push_str(&format!("log.filter = {}\n", settings.log().filter()));
    out
}
