// UI layer: the interactive chat loop and the one-shot query flow.
//
// Input is read through `LineSource` so the loop can be driven by a
// script in tests; on a terminal it is backed by `dialoguer`. All output
// goes to a caller-supplied writer (stdout in the binary).

use crate::api::{ChatBackend, TransportError};
use crate::interrupt::InterruptFlag;
use crate::models::{ChatMessage, ChatRequest, ModelDescriptor, UploadedFile};
use crossterm::style::Stylize;
use crossterm::tty::IsTty;
use dialoguer::Input;
use indicatif::{ProgressBar, ProgressStyle};
use std::io::{self, BufRead, Write};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, error};

const RULE_WIDTH: usize = 50;
const FAREWELL: &str = "👋 再見！| Goodbye!";
const NO_RESPONSE: &str = "抱歉，無法獲取回應。| Sorry, unable to get response.";

/// Source of user input lines. `Ok(None)` means input is exhausted;
/// an error of kind `Interrupted` means the user cancelled.
pub trait LineSource {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>>;
}

/// Reads from the terminal with `dialoguer`, or line by line from stdin
/// when stdin is not a terminal (piped input).
#[derive(Default)]
pub struct TerminalInput;

impl LineSource for TerminalInput {
    fn read_line(&mut self, prompt: &str) -> io::Result<Option<String>> {
        if io::stdin().is_tty() {
            // dialoguer reports Ctrl-C as `ErrorKind::Interrupted`.
            let line: String = Input::new()
                .with_prompt(prompt)
                .allow_empty(true)
                .interact_text()?;
            return Ok(Some(line));
        }
        let mut line = String::new();
        if io::stdin().lock().read_line(&mut line)? == 0 {
            return Ok(None);
        }
        Ok(Some(line))
    }
}

/// A parsed line of user input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Empty,
    Quit,
    Help,
    Models,
    Clear,
    Switch(String),
    Upload(String),
    Chat(String),
}

impl Command {
    pub fn parse(line: &str) -> Command {
        let line = line.trim();
        if line.is_empty() {
            return Command::Empty;
        }
        match line.to_lowercase().as_str() {
            "quit" | "exit" | "退出" => return Command::Quit,
            "help" => return Command::Help,
            "models" => return Command::Models,
            "clear" => return Command::Clear,
            _ => {}
        }
        if let Some(name) = keyword_arg(line, "switch") {
            return Command::Switch(name.to_string());
        }
        if let Some(path) = keyword_arg(line, "upload") {
            return Command::Upload(path.to_string());
        }
        Command::Chat(line.to_string())
    }
}

/// `"<keyword> <arg>"` with a case-insensitive keyword and a non-empty arg.
fn keyword_arg<'a>(line: &'a str, keyword: &str) -> Option<&'a str> {
    let head = line.get(..keyword.len())?;
    let rest = &line[keyword.len()..];
    if !head.eq_ignore_ascii_case(keyword) || !rest.starts_with(char::is_whitespace) {
        return None;
    }
    Some(rest.trim()).filter(|arg| !arg.is_empty())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Flow {
    Continue,
    Stop,
}

#[derive(Debug, Clone, Copy)]
enum Op {
    Models,
    Upload,
    Chat,
}

/// State of one interactive chat session.
pub struct Session<'a, B: ChatBackend> {
    backend: &'a B,
    model: String,
    pending_file: Option<UploadedFile>,
    history: Option<Vec<ChatMessage>>,
    interrupt: InterruptFlag,
}

impl<'a, B: ChatBackend> Session<'a, B> {
    pub fn new(backend: &'a B, model: impl Into<String>) -> Self {
        Session {
            backend,
            model: model.into(),
            pending_file: None,
            history: None,
            interrupt: InterruptFlag::new(),
        }
    }

    /// End the session once `interrupt` is raised during a turn.
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Send the whole conversation with every turn instead of only the
    /// latest message. The history lives in memory only.
    pub fn keep_history(mut self, keep: bool) -> Self {
        self.history = keep.then(Vec::new);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn pending_file(&self) -> Option<&UploadedFile> {
        self.pending_file.as_ref()
    }

    /// Run the read-eval-print loop until the user quits, cancels, or
    /// input runs out. A failing turn is reported and the loop goes on.
    pub fn run<L: LineSource, W: Write>(&mut self, input: &mut L, out: &mut W) -> anyhow::Result<()> {
        self.print_banner(out)?;
        loop {
            let line = match input.read_line("\n👤 您 | You") {
                Ok(Some(line)) => line,
                Ok(None) => {
                    writeln!(out, "\n{}", FAREWELL)?;
                    break;
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {
                    writeln!(out, "\n{}", FAREWELL)?;
                    break;
                }
                Err(e) => return Err(e.into()),
            };

            if self.interrupt.take() {
                writeln!(out, "\n{}", FAREWELL)?;
                break;
            }

            match self.handle(Command::parse(&line), out) {
                Ok(Flow::Continue) => {}
                Ok(Flow::Stop) => break,
                Err(e) => {
                    error!(error = %e, "turn failed");
                    writeln!(out, "{}", format!("❌ 發生錯誤: {e} | Error occurred: {e}").red())?;
                }
            }

            if self.interrupt.take() {
                debug!("interrupted during turn");
                writeln!(out, "\n{}", FAREWELL)?;
                break;
            }
        }
        Ok(())
    }

    fn handle<W: Write>(&mut self, command: Command, out: &mut W) -> anyhow::Result<Flow> {
        match command {
            Command::Empty => {}
            Command::Quit => {
                writeln!(out, "{}", FAREWELL)?;
                return Ok(Flow::Stop);
            }
            Command::Help => self.print_tips(out)?,
            Command::Models => match self.backend.list_models() {
                Ok(models) if !models.is_empty() => print_models(out, &models, true)?,
                Ok(_) => writeln!(out, "{}", "❌ 無法獲取模型列表 | Unable to get model list".red())?,
                Err(e) => report(out, Op::Models, &e)?,
            },
            Command::Switch(name) => {
                debug!(from = %self.model, to = %name, "switching model");
                self.model = name;
                writeln!(
                    out,
                    "{}",
                    format!("✅ 已切換到模型: {0} | Switched to model: {0}", self.model).green()
                )?;
            }
            Command::Upload(path) => {
                let spinner = spinner("Uploading...");
                let result = self.backend.upload_file(Path::new(&path));
                spinner.finish_and_clear();
                match result {
                    Ok(file) => {
                        print_uploaded(out, &file)?;
                        writeln!(
                            out,
                            "{}",
                            "✅ 檔案已上傳，將在下次對話中使用 | File uploaded and will be used in next conversation"
                                .green()
                        )?;
                        self.pending_file = Some(file);
                    }
                    Err(e) => report(out, Op::Upload, &e)?,
                }
            }
            Command::Clear => {
                self.pending_file = None;
                if let Some(history) = self.history.as_mut() {
                    history.clear();
                }
                writeln!(out, "🧹 已清除檔案與對話 | Cleared file and conversation")?;
            }
            Command::Chat(text) => self.chat_turn(text, out)?,
        }
        Ok(Flow::Continue)
    }

    fn chat_turn<W: Write>(&mut self, text: String, out: &mut W) -> anyhow::Result<()> {
        let user = ChatMessage::user(text);
        let messages = match &self.history {
            Some(history) => {
                let mut all = history.clone();
                all.push(user.clone());
                all
            }
            None => vec![user.clone()],
        };
        let files = self.pending_file.iter().map(UploadedFile::file_ref).collect();
        let request = ChatRequest::new(self.model.clone(), messages)
            .with_files(files)
            .streaming(true);

        print_response_header(out)?;
        let result = {
            let mut sink = FirstTokenSpinner::new(&mut *out);
            self.backend.chat_completion(&request, &mut sink)
        };
        match result {
            Ok(response) => {
                print_rule(out)?;
                if let Some(history) = self.history.as_mut() {
                    history.push(user);
                    history.push(ChatMessage::assistant(response.content().unwrap_or_default()));
                }
            }
            Err(e) => report(out, Op::Chat, &e)?,
        }
        Ok(())
    }

    fn print_banner<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(
            out,
            "\n🎯 進入互動式聊天模式 (模型: {0}) | Entering interactive chat mode (model: {0})",
            self.model
        )?;
        self.print_tips(out)
    }

    fn print_tips<W: Write>(&self, out: &mut W) -> io::Result<()> {
        writeln!(out, "💡 提示 | Tips:")?;
        writeln!(out, "   - 輸入 'quit' 或 'exit' 退出 | Type 'quit' or 'exit' to quit")?;
        writeln!(out, "   - 輸入 'upload <檔案路徑>' 上傳檔案並在下次對話中使用 | Type 'upload <file_path>' to upload a file")?;
        writeln!(out, "   - 輸入 'models' 查看可用模型 | Type 'models' to view available models")?;
        writeln!(out, "   - 輸入 'switch <模型名稱>' 切換模型 | Type 'switch <model_name>' to switch model")?;
        writeln!(out, "   - 輸入 'clear' 清除已上傳檔案 | Type 'clear' to drop the uploaded file")?;
        writeln!(out, "{}", "-".repeat(60))
    }
}

/// Upload `file` (if any), then ask `query` once and return the answer
/// text. An upload failure is reported and the question is asked without
/// the file.
pub fn simple_chat<B: ChatBackend, W: Write>(
    backend: &B,
    model: &str,
    query: &str,
    file: Option<&Path>,
    stream: bool,
    out: &mut W,
) -> anyhow::Result<String> {
    let mut files = Vec::new();
    if let Some(path) = file {
        let spinner = spinner("Uploading...");
        let result = backend.upload_file(path);
        spinner.finish_and_clear();
        match result {
            Ok(uploaded) => {
                print_uploaded(out, &uploaded)?;
                writeln!(
                    out,
                    "📄 使用檔案進行 RAG 聊天: {0} | Using file for RAG chat: {0}",
                    uploaded.display_name
                )?;
                files.push(uploaded.file_ref());
            }
            Err(e) => report(out, Op::Upload, &e)?,
        }
    }

    writeln!(out, "🤖 使用模型 | Using model: {}", model)?;
    writeln!(out, "👤 您的問題 | Your question: {}", query)?;

    let request = ChatRequest::new(model, vec![ChatMessage::user(query)])
        .with_files(files)
        .streaming(stream);

    let result = if stream {
        print_response_header(out)?;
        let mut sink = FirstTokenSpinner::new(&mut *out);
        backend.chat_completion(&request, &mut sink)
    } else {
        let spinner = spinner("Waiting for answer...");
        let result = backend.chat_completion(&request, out);
        spinner.finish_and_clear();
        result
    };
    let answer = match result {
        Ok(response) => {
            if stream {
                print_rule(out)?;
            }
            response.content().map(str::to_string)
        }
        Err(e) => {
            report(out, Op::Chat, &e)?;
            None
        }
    };
    Ok(answer.unwrap_or_else(|| NO_RESPONSE.to_string()))
}

/// Print model ids, numbered or as a bullet list.
pub fn print_models<W: Write>(out: &mut W, models: &[ModelDescriptor], numbered: bool) -> io::Result<()> {
    writeln!(out, "\n📋 可用模型 | Available models:")?;
    for (i, model) in models.iter().enumerate() {
        if numbered {
            writeln!(out, "   {}. {}", i + 1, model.label())?;
        } else {
            writeln!(out, "   - {}", model.label())?;
        }
    }
    Ok(())
}

fn print_uploaded<W: Write>(out: &mut W, file: &UploadedFile) -> io::Result<()> {
    writeln!(
        out,
        "{}",
        format!(
            "✅ 檔案上傳成功: {0} (ID: {1}) | File uploaded successfully: {0} (ID: {1})",
            file.display_name, file.id
        )
        .green()
    )
}

fn print_response_header<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "\n🤖 AI 回應 | AI Response:")?;
    writeln!(out, "{}", "-".repeat(RULE_WIDTH))
}

fn print_rule<W: Write>(out: &mut W) -> io::Result<()> {
    writeln!(out, "\n{}", "-".repeat(RULE_WIDTH))
}

/// Bilingual diagnostic for a failed call.
fn report<W: Write>(out: &mut W, op: Op, err: &TransportError) -> io::Result<()> {
    error!(?op, error = %err, "request failed");
    let msg = match (op, err) {
        (_, TransportError::FileNotFound(p)) => {
            format!("❌ 檔案不存在: {0} | File does not exist: {0}", p.display())
        }
        (_, TransportError::FileTypeNotAllowed(p)) => {
            format!("❌ 不支援的檔案類型: {0} | File type not allowed: {0}", p.display())
        }
        (_, TransportError::FileTooLarge { path, size, limit }) => format!(
            "❌ 檔案過大: {0} ({1} > {2} bytes) | File too large: {0} ({1} > {2} bytes)",
            path.display(),
            size,
            limit
        ),
        (Op::Chat, TransportError::Status { status, body }) => format!(
            "❌ 聊天請求失敗 (HTTP {0}) | Chat request failed (HTTP {0})\n錯誤詳情 | Error details: {1}",
            status, body
        ),
        (Op::Chat, e) => format!("❌ 聊天請求失敗: {0} | Chat request failed: {0}", e),
        (Op::Upload, e) => format!("❌ 檔案上傳失敗: {0} | File upload failed: {0}", e),
        (Op::Models, e) => format!("❌ 獲取模型列表失敗: {0} | Failed to get model list: {0}", e),
    };
    writeln!(out, "{}", msg.red())
}

/// Shows a spinner until the first streamed fragment is written through.
struct FirstTokenSpinner<'w, W: Write> {
    inner: &'w mut W,
    spinner: Option<ProgressBar>,
}

impl<'w, W: Write> FirstTokenSpinner<'w, W> {
    fn new(inner: &'w mut W) -> Self {
        FirstTokenSpinner { inner, spinner: Some(spinner("Thinking...")) }
    }

    fn clear(&mut self) {
        if let Some(spinner) = self.spinner.take() {
            spinner.finish_and_clear();
        }
    }
}

impl<W: Write> Write for FirstTokenSpinner<'_, W> {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.clear();
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl<W: Write> Drop for FirstTokenSpinner<'_, W> {
    fn drop(&mut self) {
        self.clear();
    }
}

fn spinner(msg: &'static str) -> ProgressBar {
    let spinner = ProgressBar::new_spinner();
    if let Ok(style) = ProgressStyle::with_template("{spinner} {msg}") {
        spinner.set_style(style);
    }
    spinner.set_message(msg);
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner
}
