mod config;
mod terminal;

use dotenv::dotenv;
use qa_client::HttpBackend;
use qa_core::{
    ChatResponse, DocumentsResponse, MessageResponse, ResetResponse, Role, UploadFile,
    UploadResponse, PDF_MIME,
};
use qa_error::{QaError, Result};
use qa_render::{Highlighter, SourceRenderer};
use qa_session::{ChatSession, PendingAsk, PendingReset, PendingUpload, Workspace};
use std::path::Path;
use std::sync::Arc;
use terminal::Style;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc::{unbounded_channel, UnboundedSender};
use tracing::{debug, info, warn};
use tracing_subscriber::{fmt, layer::SubscriberExt, EnvFilter, Registry};
use uuid::Uuid;

/// Everything the loop reacts to: typed lines and finished remote calls.
enum Event {
    Line(String),
    InputClosed,
    Uploaded(PendingUpload, Result<UploadResponse>),
    Answered(PendingAsk, Result<ChatResponse>),
    ResetDone(PendingReset, Result<ResetResponse>),
    Documents(Result<DocumentsResponse>),
    Health(Result<MessageResponse>),
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    init_tracing();

    let cfg = config::load_config()?;
    let http = Arc::new(HttpBackend::new(cfg.backend.clone())?);
    let renderer = SourceRenderer::new(Highlighter::new(&cfg.render.keywords)?);
    let mut app = App {
        workspace: Workspace::new(http.clone(), cfg.session.clone(), renderer),
        http,
        style: Style::detect(),
        printed: 0,
        lookups: 0,
    };
    info!(base_url = %cfg.backend.base_url, "docqa starting");

    let (tx, mut rx) = unbounded_channel();
    spawn_input(tx.clone());
    println!("{}", terminal::HELP);

    // Once stdin is gone, keep handling results until nothing is outstanding.
    let mut input_closed = false;
    while let Some(event) = rx.recv().await {
        let keep_going = match event {
            Event::Line(line) => app.on_line(&line, &tx).await,
            Event::InputClosed => {
                input_closed = true;
                true
            }
            Event::Uploaded(pending, outcome) => {
                match app.workspace.complete_upload(pending, outcome) {
                    Some(Ok(receipt)) => println!(
                        "uploaded {} (document {})",
                        receipt.file_name,
                        receipt.document_id.as_deref().unwrap_or("-")
                    ),
                    Some(Err(err)) => println!("{}", err.user_message()),
                    None => {}
                }
                true
            }
            Event::Answered(pending, outcome) => {
                app.workspace.complete_ask(pending, outcome);
                true
            }
            Event::ResetDone(pending, outcome) => {
                match app.workspace.complete_reset(pending, outcome) {
                    Ok(resp) => println!("{}", resp.message),
                    Err(err) => println!("{}", err.user_message()),
                }
                true
            }
            Event::Documents(outcome) => {
                app.lookups -= 1;
                match outcome {
                    Ok(docs) => print!("{}", terminal::documents(&docs)),
                    Err(err) => println!("{}", err.user_message()),
                }
                true
            }
            Event::Health(outcome) => {
                app.lookups -= 1;
                match outcome {
                    Ok(resp) => println!("server: {}", resp.message),
                    Err(err) => {
                        warn!(error = %err, "health check failed");
                        println!("{}", err.user_message());
                    }
                }
                true
            }
        };
        app.print_new_answers();
        if !keep_going {
            break;
        }
        if input_closed && app.is_idle() {
            debug!("input closed and nothing outstanding");
            break;
        }
    }

    info!("docqa exiting");
    Ok(())
}

struct App {
    workspace: Workspace,
    http: Arc<HttpBackend>,
    style: Style,
    /// Number of messages already considered for printing.
    printed: usize,
    /// `/docs` and `/health` calls still running.
    lookups: usize,
}

impl App {
    fn is_idle(&self) -> bool {
        self.lookups == 0 && self.workspace.is_idle()
    }

    /// Handles one input line. Returns `false` to quit.
    async fn on_line(&mut self, raw: &str, tx: &UnboundedSender<Event>) -> bool {
        let line = raw.trim();
        let (command, arg) = match line.split_once(char::is_whitespace) {
            Some((c, a)) => (c, a.trim()),
            None => (line, ""),
        };

        match command {
            "" => {}
            "/quit" | "/exit" => return false,
            "/help" => println!("{}", terminal::HELP),
            "/status" => print!(
                "{}",
                terminal::status(
                    self.workspace.upload_session().state(),
                    self.workspace.chat().is_loading()
                )
            ),
            "/upload" => self.upload(arg, tx).await,
            "/reset" => match self.workspace.begin_reset() {
                Ok(pending) => {
                    let backend = self.workspace.backend();
                    let tx = tx.clone();
                    tokio::spawn(async move {
                        let outcome = backend.reset().await;
                        let _ = tx.send(Event::ResetDone(pending, outcome));
                    });
                }
                Err(err) => println!("{}", err.user_message()),
            },
            "/expand" => match arg.parse::<usize>() {
                Ok(n) if n > 0 => self.disclose(|chat, id| chat.toggle_chunk(id, n - 1)),
                _ => println!("usage: /expand <n>"),
            },
            "/expand-all" => self.disclose(|chat, id| chat.toggle_all_chunks(id)),
            "/docs" => {
                self.lookups += 1;
                let http = self.http.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let outcome = http.documents().await;
                    let _ = tx.send(Event::Documents(outcome));
                });
            }
            "/health" => {
                self.lookups += 1;
                let http = self.http.clone();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let outcome = http.health().await;
                    let _ = tx.send(Event::Health(outcome));
                });
            }
            c if c.starts_with('/') => println!("unknown command {}, try /help", c),
            _ => self.ask(raw, tx),
        }
        true
    }

    fn ask(&mut self, question: &str, tx: &UnboundedSender<Event>) {
        match self.workspace.begin_ask(question) {
            Ok(Some(pending)) => {
                let backend = self.workspace.backend();
                let tx = tx.clone();
                tokio::spawn(async move {
                    let outcome = backend.ask(pending.request()).await;
                    let _ = tx.send(Event::Answered(pending, outcome));
                });
            }
            Ok(None) => {
                if self.workspace.chat().is_loading() {
                    println!("still waiting for the previous answer");
                }
            }
            Err(err) => println!("{}", err.user_message()),
        }
    }

    async fn upload(&mut self, arg: &str, tx: &UnboundedSender<Event>) {
        if arg.is_empty() {
            println!("usage: /upload <path>");
            return;
        }
        let file = match read_upload(Path::new(arg)).await {
            Ok(file) => file,
            Err(err) => {
                println!("{}", err.user_message());
                return;
            }
        };
        if let Err(err) = self.workspace.select_file(file) {
            println!("{}", err.user_message());
            return;
        }
        let Some(pending) = self.workspace.begin_upload() else {
            return;
        };
        println!("uploading {}...", pending.file().name);
        let backend = self.workspace.backend();
        let tx = tx.clone();
        tokio::spawn(async move {
            let outcome = backend.upload(pending.file()).await;
            let _ = tx.send(Event::Uploaded(pending, outcome));
        });
    }

    /// Applies a disclosure change to the last answer and reprints it.
    fn disclose<F>(&mut self, change: F)
    where
        F: FnOnce(&mut ChatSession, Uuid) -> Result<bool>,
    {
        let Some(id) = self.workspace.chat().last_answer_id() else {
            println!("no answer yet");
            return;
        };
        if let Err(err) = change(self.workspace.chat_mut(), id) {
            println!("{}", err.user_message());
            return;
        }
        let views = self.workspace.view();
        if let Some(view) = views.iter().find(|v| v.message.id == id) {
            print!("{}", terminal::message(view, self.style));
        }
    }

    /// Prints assistant messages appended since the last call.
    fn print_new_answers(&mut self) {
        let views = self.workspace.view();
        for view in views.iter().skip(self.printed) {
            if view.message.role == Role::Assistant {
                print!("{}", terminal::message(view, self.style));
            }
        }
        self.printed = views.len();
    }
}

/// Reads a file from disk; `.pdf` files are labelled `application/pdf`.
async fn read_upload(path: &Path) -> Result<UploadFile> {
    let data = tokio::fs::read(path).await.map_err(|e| QaError::Io {
        path: path.display().to_string(),
        message: e.to_string(),
    })?;
    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let is_pdf = path
        .extension()
        .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"));
    let mime = if is_pdf { PDF_MIME } else { "application/octet-stream" };
    debug!(file = %name, bytes = data.len(), mime, "file read");
    Ok(UploadFile::new(name, mime, data))
}

fn spawn_input(tx: UnboundedSender<Event>) {
    tokio::spawn(async move {
        let mut lines = BufReader::new(tokio::io::stdin()).lines();
        loop {
            match lines.next_line().await {
                Ok(Some(line)) => {
                    if tx.send(Event::Line(line)).is_err() {
                        break;
                    }
                }
                Ok(None) | Err(_) => {
                    let _ = tx.send(Event::InputClosed);
                    break;
                }
            }
        }
    });
}

fn init_tracing() {
    let fmt_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = Registry::default().with(filter).with(fmt_layer);
    tracing::subscriber::set_global_default(subscriber).ok();
}
