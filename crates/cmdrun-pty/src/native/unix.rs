use portable_pty::CommandBuilder;

use crate::process::SpawnRequest;

/// `<shell> -c <command>` in the request's directory and environment.
pub(super) fn build_command(shell: &str, request: &SpawnRequest) -> CommandBuilder {
    let mut cmd = CommandBuilder::new(shell);
    cmd.arg("-c");
    cmd.arg(&request.command);
    cmd.cwd(&request.workdir);

    for (key, value) in &request.env {
        cmd.env(key, value);
    }
    cmd.env("TERM", "xterm-256color");
    cmd.env("PWD", &request.workdir);

    cmd
}
