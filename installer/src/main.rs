fn flag_value(args: &[String], flag: &str) -> Option<Option<String>> {
    let prefix = format!("{}=", flag);
    args.iter().find_map(|a| {
        if a == flag {
            Some(None)
        } else {
            a.strip_prefix(&prefix)
                .map(|v| Some(v.trim().to_string()).filter(|v| !v.is_empty()))
        }
    })
}

fn main() {
    let args: Vec<String> = std::env::args().collect();

    // Prints the status JSON of the latest install log (or of `=timestamp`) and exits 0/1.
    if let Some(timestamp) = flag_value(&args, "--install-status") {
        platform_installer::run_install_status(timestamp);
        return;
    }

    // Non-interactive TUI smoke test mode (for automated checks).
    // Renders a single frame for a route and exits 0.
    // Usage: --tui-smoke or --tui-smoke=welcome|requirements|database|platform|admin|mailing|install
    if let Some(target) = flag_value(&args, "--tui-smoke") {
        platform_installer::run_tui_smoke(target);
        return;
    }

    platform_installer::run_tui();
}
