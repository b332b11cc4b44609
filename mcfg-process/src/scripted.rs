//! A [`ProcessRunner`] that replays canned output instead of spawning anything.

use std::sync::{Arc, Mutex};

use futures::future::BoxFuture;
use futures::FutureExt;

use crate::{Invocation, ProcessError, ProcessOutput, ProcessRunner};

#[derive(Debug)]
enum Response {
    Output(ProcessOutput),
    LaunchFailure,
}

#[derive(Debug, Default)]
struct ScriptedState {
    /// Tokens that must all appear in a command, and what to answer with.
    responses: Vec<(Vec<String>, Response)>,
    /// Every invocation we were asked to run, in order.
    invocations: Vec<Invocation>,
}

/// Answers invocations with pre-recorded [`ProcessOutput`]s.
///
/// Responses are matched in the order they were registered, the first one whose tokens
/// all appear in the invocation's command wins. An invocation that matches nothing fails
/// to launch, as if the program did not exist.
///
/// Clones share their script and the log of invocations.
#[derive(Debug, Default, Clone)]
pub struct ScriptedRunner {
    state: Arc<Mutex<ScriptedState>>,
}

impl ScriptedRunner {
    pub fn new() -> Self {
        ScriptedRunner::default()
    }

    /// Answer commands containing every one of `tokens` with `output`.
    pub fn respond(&self, tokens: &[&str], output: ProcessOutput) -> &Self {
        self.push(tokens, Response::Output(output))
    }

    /// Commands containing every one of `tokens` fail to launch.
    pub fn fail_launch(&self, tokens: &[&str]) -> &Self {
        self.push(tokens, Response::LaunchFailure)
    }

    /// Every invocation run so far.
    pub fn invocations(&self) -> Vec<Invocation> {
        self.lock().invocations.clone()
    }

    fn push(&self, tokens: &[&str], response: Response) -> &Self {
        let tokens = tokens.iter().map(|token| token.to_string()).collect();
        self.lock().responses.push((tokens, response));
        self
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ScriptedState> {
        self.state.lock().expect("scripted runner lock poisoned")
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, invocation: Invocation) -> BoxFuture<'static, Result<ProcessOutput, ProcessError>> {
        let mut state = self.lock();
        state.invocations.push(invocation.clone());

        let response = state.responses.iter().find(|(tokens, _)| {
            tokens
                .iter()
                .all(|token| invocation.command.iter().any(|arg| arg == token))
        });
        let result = match response {
            Some((_, Response::Output(output))) => Ok(output.clone()),
            Some((_, Response::LaunchFailure)) | None => Err(ProcessError::Launch {
                program: invocation.program().unwrap_or_default().to_string(),
                source: std::io::Error::from(std::io::ErrorKind::NotFound),
            }),
        };
        tracing::debug!(%invocation, ok = result.is_ok(), "scripted process");

        futures::future::ready(result).boxed()
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[tokio::test]
    async fn first_match_wins() {
        let runner = ScriptedRunner::new();
        runner
            .respond(&["clang", "-xc"], ProcessOutput::new(0, ["c"], []))
            .respond(&["clang"], ProcessOutput::new(0, ["any"], []))
            .fail_launch(&["gcc"]);

        let c = Invocation::new(vec!["clang".into(), "-xc".into()]);
        let cpp = Invocation::new(vec!["clang".into(), "-xc++".into()]);
        assert_eq!(runner.run(c.clone()).await.unwrap().stdout, vec!["c"]);
        assert_eq!(runner.run(cpp).await.unwrap().stdout, vec!["any"]);

        let gcc = Invocation::new(vec!["gcc".into()]);
        assert!(runner.run(gcc).await.is_err());
        let unknown = Invocation::new(vec!["icc".into()]);
        assert!(runner.run(unknown).await.is_err());

        let invocations = runner.invocations();
        assert_eq!(invocations.len(), 4);
        assert_eq!(invocations[0], c);
    }
}
