//! Routing configuration rendering

use crate::models::app::Application;

/// File extension of generated site blocks
pub const CONFIG_EXTENSION: &str = "caddy";

/// Render the Caddy site block routing every hostname of an application to
/// its local port
pub fn render(app: &Application, base_domain: &str) -> String {
    let hosts = app.hostnames(base_domain).join(", ");
    format!(
        "# {} ({})\n{} {{\n\treverse_proxy 127.0.0.1:{}\n}}\n",
        single_line(&app.name),
        app.id,
        hosts,
        app.port
    )
}

/// The comment line must not be able to end early
fn single_line(text: &str) -> String {
    text.chars().map(|c| if c.is_control() { ' ' } else { c }).collect()
}

/// Name of the configuration file of an application
pub fn file_name(app_id: &str) -> String {
    format!("{}.{}", app_id, CONFIG_EXTENSION)
}

/// Inverse of [`file_name`]
pub fn app_id_of(file_name: &str) -> Option<&str> {
    file_name
        .strip_suffix(CONFIG_EXTENSION)
        .and_then(|name| name.strip_suffix('.'))
        .filter(|id| !id.is_empty())
}
