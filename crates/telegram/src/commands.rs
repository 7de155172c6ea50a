use std::sync::Arc;

use teloxide::{dispatching::UpdateHandler, prelude::*, utils::command::BotCommands};
use tracing::{info, warn};

use common::{EngineCommand, EngineState};
use engine::EngineHandle;

type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

/// Dependencies injected into every handler via `dptree`.
#[derive(Clone)]
pub struct BotDeps {
    pub engine: EngineHandle,
    pub allowed_user_ids: Arc<Vec<i64>>,
    /// Symbols being evaluated, shown by /status.
    pub symbols: Arc<Vec<String>>,
}

/// Telegram bot commands exposed to the operator.
#[derive(BotCommands, Clone, Debug, PartialEq)]
#[command(rename_rule = "lowercase", description = "Signal bot commands:")]
pub enum Command {
    #[command(description = "Show engine state and cycle count")]
    Status,
    #[command(description = "Suspend evaluation cycles")]
    Pause,
    #[command(description = "Resume evaluation cycles")]
    Resume,
    #[command(description = "Finish the current cycle and shut down")]
    Stop,
}

/// Run the command bot in long-polling mode until the task is dropped.
pub async fn start_bot(bot: Bot, deps: BotDeps) {
    let deps = Arc::new(deps);

    info!("Telegram command bot starting (long-polling)");

    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![deps])
        .build()
        .dispatch()
        .await;
}

fn schema() -> UpdateHandler<Box<dyn std::error::Error + Send + Sync>> {
    use dptree::case;

    let command_handler = teloxide::filter_command::<Command, _>()
        .branch(case![Command::Status].endpoint(handle_status))
        .branch(case![Command::Pause].endpoint(handle_pause))
        .branch(case![Command::Resume].endpoint(handle_resume))
        .branch(case![Command::Stop].endpoint(handle_stop));

    Update::filter_message()
        .filter_map(|msg: Message| msg.from().map(|u| u.id))
        .filter_async(auth_filter)
        .branch(command_handler)
}

/// Silently drop messages from users not in the allowed list.
async fn auth_filter(user_id: UserId, deps: Arc<BotDeps>) -> bool {
    let uid = user_id.0 as i64;
    let allowed = is_allowed(&deps.allowed_user_ids, uid);
    if !allowed {
        warn!(user_id = uid, "Unauthorized Telegram access attempt");
    }
    allowed
}

fn is_allowed(allowed: &[i64], user_id: i64) -> bool {
    allowed.contains(&user_id)
}

fn status_text(state: EngineState, cycles: u64, symbols: &[String]) -> String {
    let watching = if symbols.is_empty() {
        "none".to_string()
    } else {
        symbols.join(", ")
    };
    format!(
        "Signal bot status\n\
         Engine: {state}\n\
         Cycles: {cycles}\n\
         Symbols: {watching}"
    )
}

/// Reply for a pause/resume request, or `None` if the command applies.
fn transition_refusal(cmd: &EngineCommand, state: EngineState) -> Option<&'static str> {
    match (cmd, state) {
        (_, EngineState::Stopped) => Some("Engine is stopped."),
        (EngineCommand::Pause, EngineState::Paused) => Some("Engine is already paused."),
        (EngineCommand::Resume, EngineState::Running) => Some("Engine is already running."),
        _ => None,
    }
}

async fn handle_status(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    let state = deps.engine.state().await;
    let text = status_text(state, deps.engine.cycles(), &deps.symbols);
    bot.send_message(msg.chat.id, text).await?;
    Ok(())
}

async fn handle_pause(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    transition(bot, msg, deps, EngineCommand::Pause, "Engine paused.").await
}

async fn handle_resume(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    transition(bot, msg, deps, EngineCommand::Resume, "Engine resumed.").await
}

async fn transition(
    bot: Bot,
    msg: Message,
    deps: Arc<BotDeps>,
    cmd: EngineCommand,
    done: &str,
) -> HandlerResult {
    let state = deps.engine.state().await;
    let reply = match transition_refusal(&cmd, state) {
        Some(refusal) => refusal,
        None => {
            deps.engine.send(cmd).await;
            done
        }
    };
    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn handle_stop(bot: Bot, msg: Message, deps: Arc<BotDeps>) -> HandlerResult {
    if deps.engine.state().await == EngineState::Stopped {
        bot.send_message(msg.chat.id, "Engine is already stopped.").await?;
    } else {
        bot.send_message(msg.chat.id, "Stopping after the current cycle\u{2026}").await?;
        deps.engine.send(EngineCommand::Stop).await;
    }
    Ok(())
}
