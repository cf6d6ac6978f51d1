use sftools::config::ConfigError;
use sftools::session::AuthError;
use sftools::ui::output;
use sftools::SfError;

/// Taxonomy name of a CLI failure, if it came from the library.
fn kind(err: &anyhow::Error) -> Option<&'static str> {
    if let Some(sf) = err.downcast_ref::<SfError>() {
        Some(sf.kind())
    } else if err.downcast_ref::<AuthError>().is_some() {
        Some("AuthError")
    } else if err.downcast_ref::<ConfigError>().is_some() {
        Some("ConfigError")
    } else {
        None
    }
}

fn main() {
    if let Err(err) = sftools::cli::run() {
        match kind(&err) {
            Some(kind) => eprintln!("{}: {:#}", kind, err),
            None => output::error(format!("{:#}", err)),
        }
        std::process::exit(1);
    }
}
