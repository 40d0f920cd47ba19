use std::path::PathBuf;

use domain::{model::entity::Credential, JobsError, Result};
use tokio::process::Command;

use super::quote;

/// Exit code ssh reserves for its own failures.
pub const SSH_FAILURE: i32 = 255;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SshConfig {
    pub port: Option<u16>,
    pub username_host: String,
    pub identity_file: Option<PathBuf>,
}

/// An ssh proxy for command. It's transparent if not using ssh.
pub trait MaybeSsh {
    /// `program args...` run in `dir`, locally or on the remote host.
    fn command(&self, program: &str, args: &[String], dir: Option<&str>) -> Command;
    fn is_ssh(&self) -> bool;
}

impl<Ctx> MaybeSsh for Ctx
where
    Ctx: AsRef<Option<SshConfig>>,
{
    fn command(&self, program: &str, args: &[String], dir: Option<&str>) -> Command {
        let Some(ssh) = self.as_ref() else {
            let mut command = Command::new(program);
            command.args(args);
            if let Some(dir) = dir {
                command.current_dir(dir);
            }
            return command;
        };

        let mut remote = String::new();
        if let Some(dir) = dir {
            remote += &format!("cd {} && ", quote(dir));
        }
        remote += &quote(program);
        for arg in args {
            remote.push(' ');
            remote += &quote(arg);
        }

        let mut command = Command::new("ssh");
        command.args(["-o", "BatchMode=yes"]);
        if let Some(port) = ssh.port {
            command.args(["-p", &port.to_string()]);
        }
        if let Some(identity) = &ssh.identity_file {
            command.arg("-i").arg(identity);
        }
        command.args([&ssh.username_host, "--", &remote]);
        command
    }

    fn is_ssh(&self) -> bool {
        self.as_ref().is_some()
    }
}

impl SshConfig {
    /// Empty and `localhost` locations stay local, anything else must look
    /// like `[user@]host[:port]`. A username in the location wins over the
    /// credential's.
    pub fn from_location(location: &str, credential: Option<&Credential>) -> Result<Option<Self>> {
        let location = location.trim();
        if location.is_empty() || location == "localhost" {
            return Ok(None);
        }
        let invalid = || JobsError::InvalidLocation(location.to_owned());

        let (user, host_port) = match location.split_once('@') {
            Some((user, rest)) if !user.is_empty() => (Some(user), rest),
            Some(_) => return Err(invalid()),
            None => (None, location),
        };
        let (host, port) = match host_port.rsplit_once(':') {
            Some((host, port)) => (host, Some(port.parse::<u16>().map_err(|_| invalid())?)),
            None => (host_port, None),
        };
        if host.is_empty() || host.contains(['/', ' ', '@']) {
            return Err(invalid());
        }

        let user = user
            .map(ToOwned::to_owned)
            .or_else(|| credential.and_then(|c| c.username.clone()));
        Ok(Some(Self {
            port,
            username_host: match user {
                Some(user) => format!("{user}@{host}"),
                None => host.to_owned(),
            },
            identity_file: credential.and_then(|c| c.identity_file.clone()),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::command::ProcessExecutor;

    #[test]
    fn locations() {
        assert_eq!(SshConfig::from_location("", None).unwrap(), None);
        assert_eq!(SshConfig::from_location("localhost", None).unwrap(), None);

        let ssh = SshConfig::from_location("jdoe@hpc:2222", None).unwrap().unwrap();
        assert_eq!(ssh.username_host, "jdoe@hpc");
        assert_eq!(ssh.port, Some(2222));

        let credential = Credential {
            username: Some("bob".to_owned()),
            identity_file: Some("/keys/bob".into()),
        };
        let ssh = SshConfig::from_location("hpc", Some(&credential)).unwrap().unwrap();
        assert_eq!(ssh.username_host, "bob@hpc");
        assert_eq!(ssh.port, None);
        assert_eq!(ssh.identity_file, Some("/keys/bob".into()));

        for bad in ["@hpc", "hpc:port", "a b", "hpc:", "user@"] {
            assert!(
                matches!(SshConfig::from_location(bad, None), Err(JobsError::InvalidLocation(_))),
                "{bad}"
            );
        }
    }

    #[test]
    fn remote_command_line() {
        let ssh = ProcessExecutor::new(Some(SshConfig {
            port: Some(2222),
            username_host: "jdoe@hpc".to_owned(),
            identity_file: None,
        }));
        let command = ssh.command("qstat", &["-u".to_owned(), "my user".to_owned()], Some("/tmp/x y"));
        let args: Vec<_> = command.as_std().get_args().map(|a| a.to_string_lossy().into_owned()).collect();
        assert_eq!(command.as_std().get_program(), "ssh");
        assert_eq!(
            args,
            ["-o", "BatchMode=yes", "-p", "2222", "jdoe@hpc", "--", "cd '/tmp/x y' && qstat -u 'my user'"]
        );
        assert!(ssh.is_ssh());
    }
}
