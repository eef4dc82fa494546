use crate::config::{prompt, prompt_line, Config};
use crate::store::Store;
use anyhow::{Context, Result};
use base64::Engine as _;
use crossterm::event::{self, Event, KeyCode, KeyEventKind, KeyModifiers};
use crossterm::terminal;
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::io::{self, BufRead, IsTerminal, Write};
use std::num::NonZeroU32;

const SCHEME: &str = "pbkdf2-sha256";
const ITERATIONS: u32 = 100_000;
const SALT_LEN: usize = 16;
const HASH_LEN: usize = 32;

pub const MSG_EMPTY: &str = "用户名和密码不能为空";
pub const MSG_EXISTS: &str = "用户名已存在";
pub const MSG_REGISTERED: &str = "注册成功，请登录";
pub const MSG_LOGGED_IN: &str = "登录成功";
pub const MSG_BAD_CREDENTIALS: &str = "用户名或密码错误";
pub const MSG_MISMATCH: &str = "两次输入的密码不一致";

/// Result of a register/login attempt. `message` is shown to the user as-is.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthOutcome {
    pub ok: bool,
    pub message: &'static str,
}

impl AuthOutcome {
    fn ok(message: &'static str) -> Self {
        Self { ok: true, message }
    }

    fn fail(message: &'static str) -> Self {
        Self { ok: false, message }
    }
}

fn b64() -> base64::engine::GeneralPurpose {
    base64::engine::general_purpose::STANDARD
}

/// Hash a password as `pbkdf2-sha256$<iterations>$<salt>$<hash>`.
pub fn hash_password(password: &str) -> Result<String> {
    let mut salt = [0u8; SALT_LEN];
    SystemRandom::new()
        .fill(&mut salt)
        .map_err(|_| anyhow::anyhow!("Failed to generate password salt"))?;
    Ok(hash_with_salt(password, &salt, ITERATIONS))
}

fn hash_with_salt(password: &str, salt: &[u8], iterations: u32) -> String {
    let iters = NonZeroU32::new(iterations).unwrap_or(NonZeroU32::MIN);
    let mut out = [0u8; HASH_LEN];
    pbkdf2::derive(pbkdf2::PBKDF2_HMAC_SHA256, iters, salt, password.as_bytes(), &mut out);
    format!("{}${}${}${}", SCHEME, iters, b64().encode(salt), b64().encode(out))
}

/// Constant-time check of `password` against a stored hash. Malformed
/// hashes never verify.
pub fn verify_password(password: &str, stored: &str) -> bool {
    let parts: Vec<&str> = stored.split('$').collect();
    let [scheme, iters, salt, hash] = parts.as_slice() else {
        return false;
    };
    if *scheme != SCHEME {
        return false;
    }
    let (Some(iters), Ok(salt), Ok(hash)) = (
        iters.parse::<u32>().ok().and_then(NonZeroU32::new),
        b64().decode(salt),
        b64().decode(hash),
    ) else {
        return false;
    };
    pbkdf2::verify(pbkdf2::PBKDF2_HMAC_SHA256, iters, &salt, password.as_bytes(), &hash).is_ok()
}

pub fn register(store: &Store, username: &str, password: &str) -> Result<AuthOutcome> {
    let username = username.trim();
    if username.is_empty() || password.is_empty() {
        return Ok(AuthOutcome::fail(MSG_EMPTY));
    }
    if store.get_user(username)?.is_some() {
        return Ok(AuthOutcome::fail(MSG_EXISTS));
    }
    let hash = hash_password(password)?;
    if !store.create_user(username, &hash)? {
        return Ok(AuthOutcome::fail(MSG_EXISTS));
    }
    tracing::info!(user = %username, "user registered");
    Ok(AuthOutcome::ok(MSG_REGISTERED))
}

pub fn login(store: &Store, username: &str, password: &str) -> Result<AuthOutcome> {
    let username = username.trim();
    let verified = match store.get_user(username)? {
        Some(user) => verify_password(password, &user.password_hash),
        None => false,
    };
    if verified {
        tracing::info!(user = %username, "login succeeded");
        Ok(AuthOutcome::ok(MSG_LOGGED_IN))
    } else {
        tracing::warn!(user = %username, "login failed");
        Ok(AuthOutcome::fail(MSG_BAD_CREDENTIALS))
    }
}

/// Line source for the login form. Passwords go through `read_secret` so
/// a terminal can mask them.
pub trait FormInput {
    fn read_line(&mut self, label: &str) -> Result<String>;

    fn read_secret(&mut self, label: &str) -> Result<String> {
        self.read_line(label)
    }
}

/// Reads from any buffered input, echoing labels to `out`.
pub struct LineInput<R, W> {
    input: R,
    out: W,
}

impl<R: BufRead, W: Write> LineInput<R, W> {
    pub fn new(input: R, out: W) -> Self {
        Self { input, out }
    }
}

impl<R: BufRead, W: Write> FormInput for LineInput<R, W> {
    fn read_line(&mut self, label: &str) -> Result<String> {
        prompt_line(&mut self.input, &mut self.out, label)
    }
}

/// Stdin/stdout. Passwords are masked when stdin is a terminal.
pub struct Console;

impl FormInput for Console {
    fn read_line(&mut self, label: &str) -> Result<String> {
        prompt(label)
    }

    fn read_secret(&mut self, label: &str) -> Result<String> {
        if io::stdin().is_terminal() {
            read_masked(label)
        } else {
            prompt(label)
        }
    }
}

fn read_masked(label: &str) -> Result<String> {
    let mut stdout = io::stdout();
    write!(stdout, "  {} > ", label)?;
    stdout.flush()?;
    terminal::enable_raw_mode()?;
    let result = read_masked_raw(&mut stdout);
    let _ = terminal::disable_raw_mode();
    writeln!(stdout)?;
    result
}

fn read_masked_raw(stdout: &mut io::Stdout) -> Result<String> {
    let mut secret = String::new();
    loop {
        let Event::Key(key) = event::read()? else {
            continue;
        };
        if key.kind != KeyEventKind::Press {
            continue;
        }
        match key.code {
            KeyCode::Enter => return Ok(secret),
            KeyCode::Char('c') if key.modifiers.contains(KeyModifiers::CONTROL) => {
                anyhow::bail!("Login cancelled")
            }
            KeyCode::Char(c) => {
                secret.push(c);
                write!(stdout, "*")?;
            }
            KeyCode::Backspace => {
                if secret.pop().is_some() {
                    write!(stdout, "\x08 \x08")?;
                }
            }
            _ => continue,
        }
        stdout.flush()?;
    }
}

/// Console login form shown before the dashboard starts. Loops until a
/// login succeeds and returns the user name.
pub fn login_form(store: &Store) -> Result<String> {
    let preset = Config::preset_username();
    run_login_form(store, &mut Console, &mut io::stdout(), preset.as_deref())
}

/// The login/register loop over any input. `preset_user` skips the user
/// name question on login. Empty answers are passed on so the user sees
/// the validation message; only end of input ends the loop with an error.
pub fn run_login_form(
    store: &Store,
    input: &mut dyn FormInput,
    out: &mut dyn Write,
    preset_user: Option<&str>,
) -> Result<String> {
    writeln!(out)?;
    writeln!(out, "  彩票数据分析系统")?;
    writeln!(out, "  ────────────────")?;
    loop {
        let choice = input.read_line("[1] 登录  [2] 注册")?;
        match choice.as_str() {
            "" => continue,
            "1" => {
                let username = match preset_user {
                    Some(name) => name.to_string(),
                    None => input.read_line("用户名")?,
                };
                let password = input.read_secret("密码")?;
                let outcome = login(store, &username, &password)?;
                writeln!(out, "  {}", outcome.message)?;
                if outcome.ok {
                    return Ok(username.trim().to_string());
                }
            }
            "2" => {
                let username = input.read_line("新用户名")?;
                let password = input.read_secret("密码")?;
                let confirm = input.read_secret("确认密码")?;
                if password != confirm {
                    writeln!(out, "  {}", MSG_MISMATCH)?;
                    continue;
                }
                let outcome = register(store, &username, &password)
                    .context("Registration failed")?;
                writeln!(out, "  {}", outcome.message)?;
            }
            _ => writeln!(out, "  请输入 1 或 2")?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_roundtrip_and_format() {
        let hash = hash_password("s3cret").unwrap();
        let parts: Vec<&str> = hash.split('$').collect();
        assert_eq!(parts.len(), 4);
        assert_eq!(parts[0], "pbkdf2-sha256");
        assert_eq!(parts[1], "100000");
        assert!(verify_password("s3cret", &hash));
        assert!(!verify_password("wrong", &hash));
    }

    #[test]
    fn test_salts_differ() {
        assert_ne!(hash_password("same").unwrap(), hash_password("same").unwrap());
    }

    #[test]
    fn test_malformed_hash_never_verifies() {
        assert!(!verify_password("x", ""));
        assert!(!verify_password("x", "sha256$abc"));
        assert!(!verify_password("x", "pbkdf2-sha256$0$AAAA$AAAA"));
        assert!(!verify_password("x", "pbkdf2-sha256$10$!!$AAAA"));
    }

    #[test]
    fn test_register_messages() {
        let store = Store::open_in_memory().unwrap();
        assert_eq!(register(&store, "", "pw").unwrap(), AuthOutcome::fail(MSG_EMPTY));
        assert_eq!(register(&store, "alice", "").unwrap(), AuthOutcome::fail(MSG_EMPTY));
        assert_eq!(register(&store, "alice", "pw").unwrap(), AuthOutcome::ok(MSG_REGISTERED));
        assert_eq!(register(&store, "alice", "other").unwrap(), AuthOutcome::fail(MSG_EXISTS));
    }

    #[test]
    fn test_login_messages() {
        let store = Store::open_in_memory().unwrap();
        register(&store, "alice", "pw").unwrap();
        assert_eq!(login(&store, "alice", "pw").unwrap(), AuthOutcome::ok(MSG_LOGGED_IN));
        assert_eq!(login(&store, "alice", "nope").unwrap(), AuthOutcome::fail(MSG_BAD_CREDENTIALS));
        assert_eq!(login(&store, "ghost", "pw").unwrap(), AuthOutcome::fail(MSG_BAD_CREDENTIALS));
    }

    fn run_script(store: &Store, script: &str, preset: Option<&str>) -> (Result<String>, String) {
        let mut input = LineInput::new(io::Cursor::new(script.to_string()), Vec::<u8>::new());
        let mut out = Vec::new();
        let result = run_login_form(store, &mut input, &mut out, preset);
        (result, String::from_utf8(out).unwrap())
    }

    #[test]
    fn test_login_form_survives_empty_lines() {
        let store = Store::open_in_memory().unwrap();
        let (result, out) = run_script(&store, "\n2\nalice\npw\npw\n1\nalice\npw\n", None);
        assert_eq!(result.unwrap(), "alice");
        assert!(out.contains(MSG_REGISTERED));
        assert!(out.contains(MSG_LOGGED_IN));
    }

    #[test]
    fn test_login_form_reports_empty_credentials() {
        let store = Store::open_in_memory().unwrap();
        let script = "2\n\n\n\n1\n\n\n2\nbob\nx\ny\n2\nbob\nx\nx\n1\nbob\nx\n";
        let (result, out) = run_script(&store, script, None);
        assert_eq!(result.unwrap(), "bob");
        assert!(out.contains(MSG_EMPTY));
        assert!(out.contains(MSG_BAD_CREDENTIALS));
        assert!(out.contains(MSG_MISMATCH));
    }

    #[test]
    fn test_login_form_uses_preset_user_and_stops_at_eof() {
        let store = Store::open_in_memory().unwrap();
        register(&store, "carol", "pw").unwrap();
        let (result, _) = run_script(&store, "1\npw\n", Some("carol"));
        assert_eq!(result.unwrap(), "carol");

        let (result, out) = run_script(&store, "3\n", None);
        assert!(result.is_err());
        assert!(out.contains("请输入 1 或 2"));
    }

    /// Records which prompts were read as secrets.
    struct Recording {
        answers: std::collections::VecDeque<&'static str>,
        secrets: Vec<String>,
    }

    impl FormInput for Recording {
        fn read_line(&mut self, _label: &str) -> Result<String> {
            self.answers.pop_front().map(str::to_string).ok_or_else(|| anyhow::anyhow!("done"))
        }

        fn read_secret(&mut self, label: &str) -> Result<String> {
            self.secrets.push(label.to_string());
            self.read_line(label)
        }
    }

    #[test]
    fn test_login_form_reads_passwords_as_secrets() {
        let store = Store::open_in_memory().unwrap();
        let mut input = Recording {
            answers: ["2", "dave", "pw", "pw", "1", "dave", "pw"].into_iter().collect(),
            secrets: Vec::new(),
        };
        let user = run_login_form(&store, &mut input, &mut Vec::<u8>::new(), None).unwrap();
        assert_eq!(user, "dave");
        assert_eq!(input.secrets, vec!["密码", "确认密码", "密码"]);
    }
}
