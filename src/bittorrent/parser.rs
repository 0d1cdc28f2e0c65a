use crate::bittorrent::config::PORT;
use clap::{App, Arg, ArgMatches};
use std::ffi::OsString;

/// 命令行参数
#[derive(Debug, Default)]
pub struct CommandArgument {
    file_path: Option<String>,
    target_path: Option<String>,
    port: Option<u16>,
}

impl CommandArgument {
    pub fn new() -> Self {
        Default::default()
    }

    fn app() -> App<'static> {
        App::new("swarmget")
            .version("0.1.0")
            .about("A command-line BitTorrent client, written in Rust.")
            .author("chenlinfeng")
            .arg(
                Arg::new("torrent")
                    .help("The path to the torrent")
                    .index(1)
                    .required(true),
            )
            .arg(
                Arg::new("file")
                    .short('o')
                    .long("output")
                    .help("The path where to save the file")
                    .takes_value(true),
            )
            .arg(
                Arg::new("port")
                    .short('p')
                    .long("port")
                    .help("The port announced to the tracker")
                    .takes_value(true),
            )
    }

    pub fn parse(&mut self) -> Result<(), String> {
        let matcher = Self::app().get_matches();
        self.apply(&matcher)
    }

    pub fn parse_from<I, T>(&mut self, args: I) -> Result<(), String>
    where
        I: IntoIterator<Item = T>,
        T: Into<OsString> + Clone,
    {
        let matcher = Self::app()
            .try_get_matches_from(args)
            .map_err(|e| e.to_string())?;
        self.apply(&matcher)
    }

    fn apply(&mut self, matcher: &ArgMatches) -> Result<(), String> {
        self.file_path = matcher.value_of("torrent").map(String::from);
        self.target_path = matcher.value_of("file").map(String::from);
        self.port = match matcher.value_of("port") {
            None => None,
            Some(val) => Some(
                val.parse::<u16>()
                    .map_err(|_| format!("invalid port: {}", val))?,
            ),
        };
        Ok(())
    }

    pub fn get_torrent(&self) -> Option<&str> {
        self.file_path.as_deref()
    }

    /// 没有指定时使用torrent里的文件名
    pub fn get_target_path(&self) -> Option<&str> {
        self.target_path.as_deref()
    }

    pub fn get_port(&self) -> u16 {
        self.port.unwrap_or(PORT)
    }
}

#[cfg(test)]
mod parse_test {
    use super::CommandArgument;

    #[test]
    fn test_command_parser_unparse() {
        let parser = CommandArgument::new();
        assert_eq!(parser.get_torrent(), None);
        assert_eq!(parser.get_target_path(), None);
        assert_eq!(parser.get_port(), 6881);
    }

    #[test]
    fn test_command_correct() {
        let mut parser = CommandArgument::new();
        parser
            .parse_from(vec!["swarmget", "debian.torrent", "-o", "out.iso", "-p", "7000"])
            .unwrap();
        assert_eq!(parser.get_torrent(), Some("debian.torrent"));
        assert_eq!(parser.get_target_path(), Some("out.iso"));
        assert_eq!(parser.get_port(), 7000);
    }

    #[test]
    fn test_command_requires_torrent() {
        let mut parser = CommandArgument::new();
        assert!(parser.parse_from(vec!["swarmget"]).is_err());
    }

    #[test]
    fn test_command_bad_port() {
        let mut parser = CommandArgument::new();
        assert!(parser
            .parse_from(vec!["swarmget", "a.torrent", "-p", "http"])
            .is_err());
    }
}
