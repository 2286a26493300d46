//! Argument-vector builders for ssh and the remote MySQL tools.
//!
//! Local processes are always started from a discrete argument vector. The
//! only string that goes through a shell is the command ssh hands to the
//! remote login shell, and every word in it is quoted with `shell_words`.
//! Passwords never appear in any argument: remote scripts read the password
//! from stdin into `MYSQL_PWD` first.

use tokio::process::Command;

use crate::config::{DatabaseConfig, SshTarget};

/// Non-interactive ssh options shared by every remote invocation.
pub const SSH_OPTIONS: [&str; 4] = [
    "-o",
    "BatchMode=yes",
    "-o",
    "StrictHostKeyChecking=no",
];

/// Build `ssh <options> user@host <remote>`.
pub fn ssh_command(target: &SshTarget, remote: &str) -> Command {
    let mut cmd = Command::new("ssh");
    cmd.args(SSH_OPTIONS)
        .arg(target.destination())
        .arg(remote)
        .kill_on_drop(false);
    cmd
}

/// The `-e` argument rsync uses to open its ssh transport.
pub fn rsync_shell() -> String {
    let mut words = vec!["ssh"];
    words.extend(SSH_OPTIONS);
    words.join(" ")
}

/// Prefix a remote command so it reads the MySQL password from the first stdin line.
pub fn with_password_from_stdin(remote: &str) -> String {
    format!("IFS= read -r MYSQL_PWD; export MYSQL_PWD; {}", remote)
}

/// Line written to the ssh child's stdin for [`with_password_from_stdin`].
pub fn password_line(db: &DatabaseConfig) -> String {
    format!("{}\n", db.password)
}

/// Remote `mysql` invocation running a single statement in batch/silent mode.
pub fn remote_query(db: &DatabaseConfig, sql: &str) -> String {
    let port = db.port.to_string();
    let words = [
        "mysql",
        "-h",
        db.host.as_str(),
        "-P",
        port.as_str(),
        "-u",
        db.user.as_str(),
        "-D",
        db.database.as_str(),
        "-se",
        sql,
    ];
    with_password_from_stdin(&shell_words::join(words))
}

/// Remote `stat` of a single path.
pub fn remote_stat(path: &str) -> String {
    shell_words::join(["stat", path])
}
