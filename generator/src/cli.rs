use std::path::PathBuf;

use clap::Parser;

use crate::emitters::Role;

#[derive(Parser, Debug)]
#[command(version, about = "Generate libspooky wrappers from an RPC definition file")]
pub struct Cli {
    #[arg(
        long,
        help = "Generate server-side wrappers. By default, client-side wrappers are generated instead"
    )]
    pub server: bool,

    #[arg(short, long, help = "The RPC definition file to parse")]
    pub input: PathBuf,

    #[arg(short, long, help = "A path for the resulting wrapper source file")]
    pub source: PathBuf,

    #[arg(short = 'H', long, help = "A path for the resulting wrapper header file")]
    pub header: PathBuf,
}

impl Cli {
    pub fn role(&self) -> Role {
        if self.server {
            Role::Server
        } else {
            Role::Client
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_short_and_long_flags() {
        let cli = Cli::try_parse_from([
            "spookygen", "-i", "echo.spooky", "-s", "out/echo.c", "-H", "out/echo.h",
        ])
        .unwrap();
        assert_eq!(cli.role(), Role::Client);
        assert_eq!(cli.input, PathBuf::from("echo.spooky"));
        assert_eq!(cli.header, PathBuf::from("out/echo.h"));

        let cli = Cli::try_parse_from([
            "spookygen", "--server", "--input", "echo.spooky", "--source", "echo.c", "--header",
            "echo.h",
        ])
        .unwrap();
        assert_eq!(cli.role(), Role::Server);
        assert_eq!(cli.source, PathBuf::from("echo.c"));
    }

    #[test]
    fn outputs_are_required() {
        assert!(Cli::try_parse_from(["spookygen", "-i", "echo.spooky", "-s", "echo.c"]).is_err());
    }

    #[test]
    fn command_is_well_formed() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
