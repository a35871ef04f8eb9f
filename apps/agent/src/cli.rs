use std::path::PathBuf;

use clap::Parser;

/// Uppe monitoring agent
#[derive(Debug, Parser)]
#[command(version, about)]
pub struct Cli {
    /// Configuration file, created with defaults when missing
    #[arg(short, long, env = "UPPE_AGENT_CONFIG")]
    pub config: Option<PathBuf>,

    /// Only run the configured checks, without the RPC server
    #[arg(long)]
    pub standalone: bool,

    /// Port of the RPC server, overrides the configuration file
    #[arg(short, long)]
    pub port: Option<u16>,

    /// Print the effective configuration on start-up
    #[arg(long)]
    pub print_config: bool,
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_is_well_formed() {
        Cli::command().debug_assert();
    }

    #[test]
    fn overrides_parse() {
        let cli = Cli::parse_from(["uppe-agent", "--standalone", "-p", "9100", "-c", "agent.toml"]);
        assert!(cli.standalone);
        assert_eq!(cli.port, Some(9100));
        assert_eq!(cli.config, Some(PathBuf::from("agent.toml")));
    }
}
