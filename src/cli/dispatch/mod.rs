use crate::cli::actions::Action;
use anyhow::Result;

pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    Ok(Action::Server {
        port: matches.get_one::<u16>("port").copied().unwrap_or(8080),
        dsn: matches
            .get_one("dsn")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --dsn"))?,
        base_url: matches
            .get_one("base-url")
            .map(|s: &String| s.to_string())
            .ok_or_else(|| anyhow::anyhow!("missing required argument: --base-url"))?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::commands;

    #[test]
    fn handler_builds_server_action() -> Result<()> {
        let matches = commands::new().get_matches_from(vec![
            "gatehouse",
            "--port",
            "9000",
            "--dsn",
            "memory:",
            "--base-url",
            "https://console.example.com",
        ]);
        let action = handler(&matches)?;
        let Action::Server {
            port,
            dsn,
            base_url,
        } = action;
        assert_eq!(port, 9000);
        assert_eq!(dsn, "memory:");
        assert_eq!(base_url, "https://console.example.com");
        Ok(())
    }
}
