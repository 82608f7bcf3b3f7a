use std::sync::Arc;

use codequiz::config::{Config, EnvFile};
use codequiz::quiz::accessor::CacheAccessor;
use codequiz::quiz::cache::QuestionCache;
use codequiz::quiz::generator::QuestionGenerator;
use codequiz::quiz::refill::{RefillPolicy, RefillWorker};
use codequiz::quiz::session::{answer_rows, render_question, unix_now, QuizSession, Verdict};
use log::{error, info};
use teloxide::{
    dispatching::dialogue::{serializer::Json, ErasedStorage, SqliteStorage, Storage},
    prelude::*,
    types::{ChatAction, KeyboardButton, KeyboardMarkup, KeyboardRemove, ParseMode},
    utils::html::escape,
};

type QuizDialogue = Dialogue<State, ErasedStorage<State>>;
type HandlerResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;
type QuizStorage = Arc<ErasedStorage<State>>;

#[derive(Clone, Default, serde::Serialize, serde::Deserialize)]
pub enum State {
    #[default]
    Start,
    Quiz {
        session: QuizSession,
    },
}

#[derive(Clone, Copy)]
struct QuizRules {
    length: u32,
}

#[tokio::main]
async fn main() {
    let env_file = EnvFile::load();
    pretty_env_logger::init();
    env_file.log();

    if let Err(e) = run().await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run() -> HandlerResult {
    let config = Config::from_env()?;
    config.log_summary();

    let bot = Bot::new(config.bot_token.clone());

    info!("Opening dialogue storage at {}", config.db_path);
    let storage: QuizStorage = SqliteStorage::open(&config.db_path, Json).await?.erase();

    let cache = Arc::new(QuestionCache::new(config.cache_size));
    let generator = Arc::new(QuestionGenerator::new(config.model_client()?));

    let policy = RefillPolicy {
        cache_min: config.cache_min,
        ..RefillPolicy::default()
    };
    RefillWorker::new(cache.clone(), generator.clone(), policy).spawn();

    let accessor = Arc::new(CacheAccessor::new(cache, generator, config.wait));
    let rules = QuizRules {
        length: config.quiz_length,
    };

    info!("Starting quiz bot...");

    Dispatcher::builder(
        bot,
        Update::filter_message()
            .enter_dialogue::<Message, ErasedStorage<State>, State>()
            .branch(dptree::case![State::Start].endpoint(start))
            .branch(dptree::case![State::Quiz { session }].endpoint(answer)),
    )
    .dependencies(dptree::deps![storage, accessor, rules])
    .enable_ctrlc_handler()
    .build()
    .dispatch()
    .await;

    Ok(())
}

const RESTART_COMMAND: &str = "/start";

async fn start(
    bot: Bot,
    dialogue: QuizDialogue,
    msg: Message,
    accessor: Arc<CacheAccessor>,
    rules: QuizRules,
) -> HandlerResult {
    let greeting = format!(
        "¡Hola! Soy un bot de ejercicios de Python. Te haré {} preguntas sobre la salida de fragmentos de código. ¡Empecemos!",
        rules.length
    );
    bot.send_message(msg.chat.id, greeting).await?;

    // The question may take a while if the cache is empty.
    let _ = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await;

    let session = QuizSession::start(accessor.obtain().await);
    send_question(&bot, msg.chat.id, &session).await?;

    dialogue.update(State::Quiz { session }).await?;
    Ok(())
}

async fn answer(
    bot: Bot,
    dialogue: QuizDialogue,
    mut session: QuizSession,
    msg: Message,
    accessor: Arc<CacheAccessor>,
    rules: QuizRules,
) -> HandlerResult {
    let Some(choice) = msg.text() else {
        bot.send_message(msg.chat.id, "Por favor, elige una de las opciones")
            .await?;
        return Ok(());
    };

    if choice.trim() == RESTART_COMMAND {
        return start(bot, dialogue, msg, accessor, rules).await;
    }

    match session.answer(choice) {
        Verdict::Correct => {
            bot.send_message(msg.chat.id, "¡Correcto!").await?;
        }
        Verdict::Wrong {
            correct_answer,
            explanation,
        } => {
            let mut reply = format!(
                "Incorrecto. La respuesta correcta es: <b>{}</b>",
                escape(&correct_answer)
            );
            if !explanation.is_empty() {
                reply.push_str(&format!("\n\n{}", escape(&explanation)));
            }
            bot.send_message(msg.chat.id, reply)
                .parse_mode(ParseMode::Html)
                .await?;
        }
    }

    if session.is_finished(rules.length) {
        for text in session.summary(unix_now()) {
            bot.send_message(msg.chat.id, text)
                .parse_mode(ParseMode::Html)
                .reply_markup(KeyboardRemove::new())
                .await?;
        }
        bot.send_message(msg.chat.id, "Escribe /start para empezar otro quiz.")
            .await?;

        dialogue.update(State::Start).await?;
        return Ok(());
    }

    let _ = bot.send_chat_action(msg.chat.id, ChatAction::Typing).await;

    session.advance(accessor.obtain().await);
    send_question(&bot, msg.chat.id, &session).await?;

    dialogue.update(State::Quiz { session }).await?;
    Ok(())
}

async fn send_question(bot: &Bot, chat_id: ChatId, session: &QuizSession) -> HandlerResult {
    let keyboard = KeyboardMarkup::new(
        answer_rows(&session.current)
            .into_iter()
            .map(|row| row.into_iter().map(KeyboardButton::new).collect::<Vec<_>>())
            .collect::<Vec<_>>(),
    );

    bot.send_message(
        chat_id,
        render_question(&session.current, session.question_number()),
    )
    .parse_mode(ParseMode::Html)
    .reply_markup(keyboard)
    .await?;
    Ok(())
}
