mod ai_helper;
mod citation;
mod completion;
mod config;
mod conversation;
mod document;
mod parser;
mod quiz;
mod session;

use std::sync::Arc;

use ai_helper::AiHelper;
use completion::ChatGptCompletion;
use config::BotConfig;
use dotenv::dotenv;
use log::{info, warn};
use quiz::QuizKind;
use session::{Session, SessionError, SessionRegistry};
use teloxide::{
    dispatching::dialogue::InMemStorage,
    net::Download,
    prelude::*,
    types::{ChatAction, KeyboardButton, KeyboardMarkup, KeyboardRemove},
    utils::command::BotCommands,
};

type StudyDialogue = Dialogue<State, InMemStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

// Telegram rejects longer messages.
const MAX_MESSAGE_CHARS: usize = 4000;

#[derive(Clone, Default)]
pub enum State {
    #[default]
    Start,
    ReceiveDocument,
    Studying,
}

#[derive(BotCommands, Clone)]
#[command(rename_rule = "lowercase", description = "These commands are supported:")]
enum Command {
    #[command(description = "forget the current document and start over.")]
    Start,
    #[command(description = "show this text.")]
    Help,
    #[command(description = "show the summary of the document.")]
    Summary,
    #[command(description = "get a quiz question: mc, tf, fill or applied.")]
    Quiz(String),
    #[command(description = "skip the current quiz question.")]
    Skip,
    #[command(description = "show your quiz score.")]
    Score,
    #[command(description = "list your questions with answers and sources.")]
    Lineage,
    #[command(description = "export questions, answers and sources as JSON.")]
    Export,
}

#[tokio::main]
async fn main() {
    dotenv().ok();
    pretty_env_logger::init();
    info!("Starting document quiz bot...");

    let config = BotConfig::from_env().expect("Invalid configuration");
    let completion = ChatGptCompletion::new(&config).expect("Unable to connect with ChatGPT");

    let helper = Arc::new(AiHelper::new(Arc::new(completion), config.prompts.clone()));
    let sessions = Arc::new(SessionRegistry::new(helper, config.prompts.history_turns));

    let bot = Bot::from_env();

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, InMemStorage<State>, State>()
            .branch(dptree::entry().filter_command::<Command>().endpoint(command))
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::ReceiveDocument].endpoint(receive_document))
            .branch(dptree::case![State::Studying].endpoint(study)),
    )
    .dependencies(dptree::deps![InMemStorage::<State>::new(), sessions])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;
}

const GREETING_TEXT: &str = "Hi! I help you study a document. Send me a .txt file (or paste the text) \
and I will summarize it, answer your questions with chapter/section sources, and quiz you on it.";

async fn start(bot: Bot, dialogue: StudyDialogue, msg: Message) -> HandlerResult {
    bot.send_message(msg.chat.id, GREETING_TEXT).await?;

    dialogue.update(State::ReceiveDocument).await?;
    Ok(())
}

async fn command(
    bot: Bot,
    dialogue: StudyDialogue,
    msg: Message,
    cmd: Command,
    sessions: Arc<SessionRegistry>,
) -> HandlerResult {
    if let Command::Start = cmd {
        sessions.remove(msg.chat.id.0).await;
        info!(
            "Chat {} started over, {} chats active",
            msg.chat.id.0,
            sessions.active_chats().await
        );
        dialogue.update(State::ReceiveDocument).await?;
        bot.send_message(msg.chat.id, GREETING_TEXT)
            .reply_markup(KeyboardRemove::new())
            .await?;
        return Ok(());
    }

    let handle = sessions.get(msg.chat.id.0).await;
    let mut session = handle.lock().await;

    let reply = match cmd {
        Command::Start => GREETING_TEXT.to_string(),
        Command::Help => Command::descriptions().to_string(),
        Command::Summary => session
            .summary()
            .map(str::to_string)
            .unwrap_or_else(|err| err.to_string()),
        Command::Quiz(kind) => match kind.parse::<QuizKind>() {
            Ok(kind) => return send_quiz(&bot, &msg, &mut session, kind).await,
            Err(err) => err.to_string(),
        },
        Command::Skip => match session.discard_quiz() {
            Ok(item) => format!(
                "Skipped. The answer was: {}\nSend /quiz for another question.",
                item.correct_answer_text()
            ),
            Err(err) => err.to_string(),
        },
        Command::Score => match (session.scores(), session.conversation(), session.quiz()) {
            (Ok(scores), Ok(turns), Ok(quiz)) => {
                let history: String = scores
                    .outcomes()
                    .iter()
                    .map(|correct| if *correct { '✅' } else { '❌' })
                    .collect();
                let mut reply = format!(
                    "Your score: {}\n{}\nQuestions asked: {}",
                    scores,
                    history,
                    turns.len() / 2
                );
                if quiz.is_pending() {
                    reply.push_str("\nA quiz question is waiting for your answer.");
                }
                reply
            }
            (Err(err), _, _) | (_, Err(err), _) | (_, _, Err(err)) => err.to_string(),
        },
        Command::Lineage => match session.lineage() {
            Ok(lineage) if lineage.is_empty() => "You have not asked anything yet.".to_string(),
            Ok(lineage) => lineage
                .iter()
                .enumerate()
                .map(|(i, entry)| {
                    format!(
                        "{}. Q: {}\nA: {}\nSource: {}",
                        i + 1,
                        entry.question,
                        clip(&entry.answer, 300),
                        entry.citation
                    )
                })
                .collect::<Vec<_>>()
                .join("\n\n"),
            Err(err) => err.to_string(),
        },
        Command::Export => match session.lineage() {
            Ok(lineage) => serde_json::to_string_pretty(&lineage)?,
            Err(err) => err.to_string(),
        },
    };

    bot.send_message(msg.chat.id, clip(&reply, MAX_MESSAGE_CHARS))
        .await?;
    Ok(())
}

async fn receive_document(
    bot: Bot,
    dialogue: StudyDialogue,
    msg: Message,
    sessions: Arc<SessionRegistry>,
) -> HandlerResult {
    let handle = sessions.get(msg.chat.id.0).await;
    let mut session = handle.lock().await;

    if load_from_message(&bot, &msg, &mut session).await? {
        dialogue.update(State::Studying).await?;
    }
    Ok(())
}

async fn study(
    bot: Bot,
    dialogue: StudyDialogue,
    msg: Message,
    sessions: Arc<SessionRegistry>,
) -> HandlerResult {
    let handle = sessions.get(msg.chat.id.0).await;
    let mut session = handle.lock().await;

    if msg.document().is_some() {
        load_from_message(&bot, &msg, &mut session).await?;
        return Ok(());
    }

    let Some(text) = msg.text() else {
        bot.send_message(msg.chat.id, "Please send text: a question, or an answer to the quiz.")
            .await?;
        return Ok(());
    };

    if session.document().is_none() {
        // The session was reset while the dialogue still says "studying".
        dialogue.update(State::ReceiveDocument).await?;
        bot.send_message(msg.chat.id, GREETING_TEXT).await?;
        return Ok(());
    }

    let _ = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await;

    if session.has_pending_quiz() {
        let reply = match session.submit_answer(text).await {
            Ok(graded) => {
                let mut reply = if graded.correct {
                    format!("✅ {}", graded.feedback)
                } else {
                    format!("❌ {}", graded.feedback)
                };
                if let Some(recommendation) = &graded.item.recommendation {
                    reply.push_str(&format!("\n\nNext: {}", recommendation));
                }
                reply
            }
            Err(err) => err.to_string(),
        };
        let graded = session.acknowledge_grade().is_some();
        if let Ok(scores) = session.scores() {
            info!("Chat {} score: {}", msg.chat.id.0, scores);
        }

        let request = bot.send_message(msg.chat.id, clip(&reply, MAX_MESSAGE_CHARS));
        if graded {
            request.reply_markup(KeyboardRemove::new()).await?;
        } else {
            request.await?;
        }
        return Ok(());
    }

    let reply = match session.ask(text).await {
        Ok(turn) => {
            let source = match &turn.citation {
                Some(citation) if citation.is_found() => citation.to_string(),
                _ => "unclear".to_string(),
            };
            format!(
                "{}\n\nSource: {}",
                clip(&turn.content, MAX_MESSAGE_CHARS - 200),
                source
            )
        }
        Err(err) => err.to_string(),
    };

    bot.send_message(msg.chat.id, reply).await?;
    Ok(())
}

async fn send_quiz(
    bot: &Bot,
    msg: &Message,
    session: &mut Session,
    kind: QuizKind,
) -> HandlerResult {
    let _ = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await;

    match session.generate_quiz(kind).await {
        Ok(item) => {
            let text = format!("Quiz ({}):\n{}", item.kind, item.render());
            let request = bot.send_message(msg.chat.id, clip(&text, MAX_MESSAGE_CHARS));

            if item.choices.is_empty() {
                request.await?;
            } else {
                let buttons = (1..=item.choices.len())
                    .map(|i| KeyboardButton::new(i.to_string()))
                    .collect::<Vec<_>>();
                request.reply_markup(KeyboardMarkup::new(vec![buttons])).await?;
            }
        }
        Err(SessionError::Quiz(quiz::QuizError::QuizPending)) => {
            bot.send_message(
                msg.chat.id,
                "Answer the current quiz question first, or /skip it.",
            )
            .await?;
        }
        Err(err) => {
            warn!("Quiz request failed in chat {}: {}", msg.chat.id.0, err);
            bot.send_message(msg.chat.id, err.to_string()).await?;
        }
    }
    Ok(())
}

/// Loads the uploaded file, or pasted text, as the session's document.
/// Returns whether a document was loaded.
async fn load_from_message(
    bot: &Bot,
    msg: &Message,
    session: &mut Session,
) -> Result<bool, Box<dyn std::error::Error + Send + Sync>> {
    let loaded = if let Some(upload) = msg.document() {
        let file = bot.get_file(upload.file.id.clone()).await?;
        let mut bytes = Vec::new();
        bot.download_file(&file.path, &mut bytes).await?;

        let name = upload
            .file_name
            .clone()
            .unwrap_or_else(|| "document.txt".to_string());
        document::Document::from_upload(&name, bytes)
    } else if let Some(text) = msg.text() {
        document::Document::new("pasted text", text)
    } else {
        bot.send_message(msg.chat.id, "Please send a .txt file or paste the text.")
            .await?;
        return Ok(false);
    };

    let document = match loaded {
        Ok(document) => document,
        Err(err) => {
            bot.send_message(msg.chat.id, err.to_string()).await?;
            return Ok(false);
        }
    };

    let _ = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await;
    let name = document.name().to_string();
    let summary = session.load_document(document).await;

    let text = format!(
        "Loaded \"{}\".\n\nSummary:\n{}\n\nAsk me anything about it, or send /quiz to be tested.",
        name, summary
    );
    bot.send_message(msg.chat.id, clip(&text, MAX_MESSAGE_CHARS))
        .reply_markup(KeyboardRemove::new())
        .await?;
    Ok(true)
}

fn clip(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => format!("{}…", &text[..end]),
        None => text.to_string(),
    }
}
