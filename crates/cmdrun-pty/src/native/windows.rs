use portable_pty::CommandBuilder;

use crate::process::SpawnRequest;

/// `<shell> /C <command>` under ConPTY.
pub(super) fn build_command(shell: &str, request: &SpawnRequest) -> CommandBuilder {
    let mut cmd = CommandBuilder::new(shell);
    cmd.arg("/C");
    cmd.arg(&request.command);
    cmd.cwd(&request.workdir);

    for (key, value) in &request.env {
        cmd.env(key, value);
    }
    cmd.env("TERM", "xterm-256color");
    cmd.env("PWD", &request.workdir);

    cmd
}
