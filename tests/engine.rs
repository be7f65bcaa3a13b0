use std::future::Future;
use std::time::Duration;

use promptrun::engine::{run_on_engine_thread, EngineConfig, ExecutionController, LineKind, SessionState};
use tokio::task::LocalSet;

fn controller() -> ExecutionController {
    ExecutionController::new(EngineConfig::default())
}

fn texts(controller: &ExecutionController) -> Vec<String> {
    controller.transcript().into_iter().map(|line| line.text).collect()
}

fn count_kind(controller: &ExecutionController, kind: LineKind) -> usize {
    controller.transcript().iter().filter(|line| line.effective_kind() == kind).count()
}

async fn local<F: Future>(f: F) -> F::Output {
    LocalSet::new().run_until(f).await
}

#[tokio::test(start_paused = true)]
async fn prompt_waits_for_the_user_and_resumes() {
    local(async {
        let engine = controller();
        engine.start("console.log('A');\nconst name = await prompt('name?');\nconsole.log(name);\nconsole.log('B');");

        let status = engine.settled().await;
        assert_eq!(status.state, SessionState::AwaitingInput);
        assert_eq!(status.prompt.as_deref(), Some("name?"));
        assert_eq!(texts(&engine), ["Running program...", "A", "name?"]);

        engine.submit_input("x");
        let status = engine.settled().await;
        assert_eq!(status.state, SessionState::Completed);
        assert_eq!(
            texts(&engine),
            ["Running program...", "A", "name?", "x", "x", "B", "Program completed successfully"]
        );
        let kinds: Vec<_> = engine.transcript().iter().map(|l| l.effective_kind()).collect();
        assert_eq!(kinds[3], LineKind::EchoInput);
        assert_eq!(kinds[4], LineKind::ProgramOutput);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn typed_ahead_input_is_consumed_without_waiting() {
    local(async {
        let engine = controller();
        engine.submit_input("Ada");
        engine.start("const who = await prompt('who?');\nconsole.log('hi ' + who);");

        let status = engine.settled().await;
        assert_eq!(status.state, SessionState::Completed);
        let lines = texts(&engine);
        assert_eq!(lines[0], "// queued input: Ada");
        assert!(lines.contains(&"hi Ada".to_string()));
        assert_eq!(engine.pending_prompt(), None);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn timer_above_the_ceiling_fails_the_run() {
    local(async {
        let engine = controller();
        engine.start("setTimeout(() => console.log('late'), 30001);\nconsole.log('after');");

        let status = engine.settled().await;
        assert_eq!(status.state, SessionState::Failed);
        assert_eq!(count_kind(&engine, LineKind::Error), 1);
        assert_eq!(count_kind(&engine, LineKind::Success), 0);

        tokio::time::sleep(Duration::from_secs(60)).await;
        let lines = texts(&engine);
        assert!(!lines.iter().any(|l| l == "late" || l == "after"));
        assert!(lines.iter().any(|l| l.starts_with("RangeError:") && l.contains("30001")));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn new_run_supersedes_one_awaiting_input() {
    local(async {
        let engine = controller();
        let first = engine.start("const v = await prompt('first?');\nconsole.log('old ' + v);");
        assert_eq!(engine.settled().await.state, SessionState::AwaitingInput);

        let second = engine.start("console.log('second');");
        assert_ne!(first, second);
        let status = engine.settled().await;
        assert_eq!(status.session, Some(second));
        assert_eq!(status.state, SessionState::Completed);
        assert_eq!(engine.pending_prompt(), None);

        // No pending request, so the reply is queued instead of reaching the old run
        engine.submit_input("late");
        tokio::time::sleep(Duration::from_secs(1)).await;
        let lines = texts(&engine);
        assert!(!lines.iter().any(|l| l.starts_with("old")));
        assert_eq!(lines.last().map(String::as_str), Some("// queued input: late"));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn reset_clears_the_transcript_before_the_next_run() {
    local(async {
        let engine = controller();
        engine.start("console.log('one');");
        engine.settled().await;
        engine.reset();
        assert_eq!(texts(&engine), ["// Output cleared"]);
        assert_eq!(engine.state(), SessionState::Idle);

        engine.start("console.log('two');");
        engine.settled().await;
        assert_eq!(
            texts(&engine),
            ["// Output cleared", "Running program...", "two", "Program completed successfully"]
        );
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn runtime_error_reports_one_line() {
    local(async {
        let engine = controller();
        engine.start("console.log('before');\nconst o = {};\no.missing();\nconsole.log('after');");

        let status = engine.settled().await;
        assert_eq!(status.state, SessionState::Failed);
        assert_eq!(count_kind(&engine, LineKind::Error), 1);
        assert_eq!(count_kind(&engine, LineKind::Success), 0);
        let lines = texts(&engine);
        assert_eq!(lines.last().map(String::as_str), Some("TypeError: o.missing is not a function (line 3)"));
        assert!(!lines.contains(&"after".to_string()));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn syntax_error_reports_one_line() {
    local(async {
        let engine = controller();
        engine.start("console.log('never');\nlet = ;");

        assert_eq!(engine.settled().await.state, SessionState::Failed);
        let lines = texts(&engine);
        assert_eq!(lines.len(), 2);
        assert!(lines[1].starts_with("SyntaxError:"));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn unawaited_prompt_cannot_be_caught() {
    local(async {
        let engine = controller();
        engine.start("try {\n  prompt('x');\n} catch (e) {\n  console.log('caught');\n}");

        assert_eq!(engine.settled().await.state, SessionState::Failed);
        let lines = texts(&engine);
        assert!(!lines.contains(&"caught".to_string()));
        assert!(lines.last().is_some_and(|l| l.contains("must be awaited")));
        assert_eq!(engine.pending_prompt(), None);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn timers_run_before_completion() {
    local(async {
        let engine = controller();
        engine.start(
            "setTimeout(() => console.log('t2'), 200);\n\
             setTimeout(() => console.log('t1'), 100);\n\
             let n = 0;\n\
             const id = setInterval(() => { n++; console.log('tick ' + n); if (n === 3) clearInterval(id); }, 30);\n\
             const dropped = setTimeout(() => console.log('never'), 50);\n\
             clearTimeout(dropped);\n\
             console.log('main');",
        );

        assert_eq!(engine.settled().await.state, SessionState::Completed);
        assert_eq!(
            texts(&engine),
            [
                "Running program...",
                "main",
                "tick 1",
                "tick 2",
                "tick 3",
                "t1",
                "t2",
                "Program completed successfully",
            ]
        );
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn busy_loop_can_be_superseded() {
    local(async {
        let engine = controller();
        engine.start("let i = 0;\nwhile (true) { i++; }");
        tokio::task::yield_now().await;
        assert_eq!(engine.state(), SessionState::Running);

        engine.start("console.log('free');");
        let status = engine.settled().await;
        assert_eq!(status.state, SessionState::Completed);
        assert!(texts(&engine).contains(&"free".to_string()));
        assert_eq!(count_kind(&engine, LineKind::Error), 0);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn identical_runs_produce_identical_transcripts() {
    const SOURCE: &str = "const xs = [3, 1, 2];\n\
        xs.sort((a, b) => a - b);\n\
        console.log(xs.join(','));\n\
        setTimeout(() => console.log(JSON.stringify({ n: xs.length })), 10);\n\
        const answer = await prompt('go?');\n\
        console.log('got ' + answer);";

    let mut transcripts = Vec::new();
    for _ in 0..2 {
        let lines = local(async {
            let engine = controller();
            engine.submit_input("yes");
            engine.start(SOURCE);
            engine.settled().await;
            texts(&engine)
        })
        .await;
        transcripts.push(lines);
    }
    assert_eq!(transcripts[0], transcripts[1]);
    assert!(transcripts[0].contains(&"{\"n\":3}".to_string()));
}

#[tokio::test(start_paused = true)]
async fn failing_timer_ends_a_run_waiting_for_input() {
    local(async {
        let engine = controller();
        engine.start("setTimeout(() => { throw new Error('boom') }, 50);\nconst v = await prompt('wait');\nconsole.log('got ' + v);");
        assert_eq!(engine.settled().await.state, SessionState::AwaitingInput);
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(engine.state(), SessionState::Failed);
        assert_eq!(engine.pending_prompt(), None);
        let lines = texts(&engine);
        assert_eq!(lines.last().map(String::as_str), Some("Error: boom (line 1)"));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn second_prompt_while_waiting_throws_in_the_caller() {
    local(async {
        let engine = controller();
        engine.start(
            "setTimeout(async () => {\n\
               try { await prompt('second'); } catch (e) { console.log('caught ' + e.message); }\n\
             }, 10);\n\
             const v = await prompt('first');\n\
             console.log('first ' + v);",
        );
        assert_eq!(engine.settled().await.state, SessionState::AwaitingInput);
        tokio::time::sleep(Duration::from_millis(20)).await;
        assert!(texts(&engine).contains(&"caught prompt() called while another prompt is waiting for input".to_string()));

        engine.submit_input("ok");
        assert_eq!(engine.settled().await.state, SessionState::Completed);
        assert!(texts(&engine).contains(&"first ok".to_string()));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn timer_callback_waits_for_a_busy_main_body() {
    local(async {
        let engine = controller();
        engine.start(
            "let s = 0;\n\
             setTimeout(() => console.log('T'), 0);\n\
             for (let i = 0; i < 5000; i++) { s += i }\n\
             console.log('M');",
        );

        assert_eq!(engine.settled().await.state, SessionState::Completed);
        assert_eq!(texts(&engine), ["Running program...", "M", "T", "Program completed successfully"]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn superseded_interval_stops_ticking() {
    local(async {
        let engine = controller();
        engine.start("setInterval(() => console.log('tick'), 10);");
        tokio::time::sleep(Duration::from_millis(35)).await;
        assert!(texts(&engine).contains(&"tick".to_string()));

        engine.start("console.log('B');");
        assert_eq!(engine.settled().await.state, SessionState::Completed);
        tokio::time::sleep(Duration::from_secs(1)).await;

        let lines = texts(&engine);
        let second = lines.iter().rposition(|l| l == "Running program...").expect("second run");
        assert_eq!(lines[second..], ["Running program...", "B", "Program completed successfully"]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn reset_drops_typed_ahead_input() {
    local(async {
        let engine = controller();
        engine.submit_input("stale");
        engine.reset();
        assert_eq!(texts(&engine), ["// Output cleared"]);

        engine.start("const v = await prompt('fresh?');\nconsole.log('got ' + v);");
        let status = engine.settled().await;
        assert_eq!(status.state, SessionState::AwaitingInput);
        assert_eq!(engine.pending_prompt().as_deref(), Some("fresh?"));
        assert!(!texts(&engine).iter().any(|l| l.contains("stale")));
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn new_run_stays_silent_during_the_grace_delay() {
    local(async {
        let engine = controller();
        engine.start("const v = await prompt('first?');\nconsole.log('old ' + v);");
        assert_eq!(engine.settled().await.state, SessionState::AwaitingInput);

        engine.start("console.log('B');");
        tokio::time::sleep(Duration::from_millis(50)).await;
        let lines = texts(&engine);
        assert_eq!(lines.last().map(String::as_str), Some("Running program..."));
        assert!(!lines.contains(&"B".to_string()));
        assert_eq!(engine.state(), SessionState::Running);

        assert_eq!(engine.settled().await.state, SessionState::Completed);
        let lines = texts(&engine);
        assert_eq!(lines[lines.len() - 3..], ["Running program...", "B", "Program completed successfully"]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn prompt_without_a_message_still_shows_a_prompt_line() {
    local(async {
        let engine = controller();
        engine.start("const v = await prompt();\nconsole.log('[' + v + ']');");
        assert_eq!(engine.settled().await.state, SessionState::AwaitingInput);

        let transcript = engine.transcript();
        assert_eq!(transcript.len(), 2);
        assert_eq!(transcript[1].text, "");
        assert_eq!(transcript[1].effective_kind(), LineKind::System);

        engine.submit_input("ok");
        assert_eq!(engine.settled().await.state, SessionState::Completed);
        assert_eq!(texts(&engine), ["Running program...", "", "ok", "[ok]", "Program completed successfully"]);
    })
    .await;
}

#[tokio::test(start_paused = true)]
async fn oversized_allocation_fails_the_run_and_the_next_run_works() {
    local(async {
        let engine = controller();
        engine.start("const a = [];\na.length = 1e18;\nconsole.log('unreachable');");
        assert_eq!(engine.settled().await.state, SessionState::Failed);
        assert_eq!(count_kind(&engine, LineKind::Error), 1);
        assert_eq!(texts(&engine).last().map(String::as_str), Some("RangeError: Invalid array length (line 2)"));

        engine.start("console.log('x'.repeat(3));");
        assert_eq!(engine.settled().await.state, SessionState::Completed);
        assert!(texts(&engine).contains(&"xxx".to_string()));
    })
    .await;
}

const DEPTH: &str = "function depth(n) { return n === 0 ? 0 : 1 + depth(n - 1) }\n";

#[test]
fn deep_recursion_ends_in_a_range_error() {
    let (shallow, deep) = run_on_engine_thread(|| async {
        let engine = controller();
        engine.start(format!("{DEPTH}console.log(depth(250));"));
        let shallow = (engine.settled().await.state, texts(&engine));

        engine.reset();
        engine.start(format!("{DEPTH}console.log(depth(10000));"));
        let deep = (engine.settled().await.state, texts(&engine), count_kind(&engine, LineKind::Error));
        (shallow, deep)
    })
    .expect("engine thread");

    assert_eq!(shallow.0, SessionState::Completed);
    assert_eq!(shallow.1, ["Running program...", "250", "Program completed successfully"]);

    let (state, lines, errors) = deep;
    assert_eq!(state, SessionState::Failed);
    assert_eq!(errors, 1);
    assert!(lines.last().is_some_and(|l| l.starts_with("RangeError: Maximum call stack size exceeded")));
}

#[test]
fn deeply_nested_source_is_a_syntax_error() {
    let (state, lines) = run_on_engine_thread(|| async {
        let engine = controller();
        engine.start(format!("console.log({}1{});", "(".repeat(3000), ")".repeat(3000)));
        (engine.settled().await.state, texts(&engine))
    })
    .expect("engine thread");

    assert_eq!(state, SessionState::Failed);
    assert_eq!(lines.len(), 2);
    assert!(lines[1].starts_with("SyntaxError: Maximum nesting depth exceeded"));
}
