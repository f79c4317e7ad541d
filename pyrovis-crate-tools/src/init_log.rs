use std::io::Write;
use std::path::PathBuf;
use std::str::FromStr;

use anyhow::Context;

/// 日志初始化参数
///
/// - `level`: 全局的日志过滤等级
/// - `output`: 日志文件路径；为 None 时输出到 stderr
#[derive(Debug, Clone)]
pub struct LogOptions {
    pub level: log::LevelFilter,
    pub output: Option<PathBuf>,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            level: log::LevelFilter::Info,
            output: None,
        }
    }
}

impl LogOptions {
    /// 从配置文件中的字符串解析日志等级，大小写不敏感
    ///
    /// 除了 log crate 的等级名之外，还接受 `warning` 和 `critical`
    pub fn parse_level(level: &str) -> anyhow::Result<log::LevelFilter> {
        let normalized = match level.to_ascii_lowercase().as_str() {
            "warning" => "warn".to_string(),
            "critical" | "fatal" => "error".to_string(),
            other => other.to_string(),
        };
        log::LevelFilter::from_str(&normalized).with_context(|| format!("unknown log level: {level}"))
    }
}

/// 初始化全局 logger，重复调用会返回错误
pub fn init_log(options: &LogOptions) -> anyhow::Result<()> {
    let mut builder = env_logger::Builder::new();
    builder
        .format(|buf, record| {
            let info_style = buf
                .default_level_style(log::Level::Info)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Green)));
            let warn_style = buf
                .default_level_style(log::Level::Warn)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Yellow)));
            let error_style = buf
                .default_level_style(log::Level::Error)
                .fg_color(Some(anstyle::Color::Ansi(anstyle::AnsiColor::Red)));

            let level_style = match record.level() {
                log::Level::Info => info_style,
                log::Level::Warn => warn_style,
                log::Level::Error => error_style,
                _ => buf.default_level_style(record.level()),
            };
            let grey_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(110, 110, 110))));
            let text_style = info_style.fg_color(Some(anstyle::Color::Rgb(anstyle::RgbColor(75, 75, 75))));

            let line = record.line().unwrap_or(!0);
            let file = record.file().unwrap_or("").rsplit(['/', '\\']).next().unwrap_or("");
            let time = chrono::Local::now().format("%H:%M:%S%.3f");
            let level = record.level();

            writeln!(
                buf,
                "{level_style}[{time}] {level}{level_style:#} {grey_style}[{file}:{line}]{grey_style:#} \
                 {text_style}{}{text_style:#}",
                record.args()
            )
        })
        .filter(None, options.level);

    if let Some(path) = &options.output {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create log directory: {}", parent.display()))?;
        }
        let file = std::fs::File::create(path)
            .with_context(|| format!("failed to create log file: {}", path.display()))?;
        builder.write_style(env_logger::WriteStyle::Never).target(env_logger::Target::Pipe(Box::new(file)));
    }

    builder.try_init().context("logger already initialized")?;
    log::info!("logger initialized, level: {}", options.level);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_level_accepts_aliases() {
        assert_eq!(LogOptions::parse_level("INFO").unwrap(), log::LevelFilter::Info);
        assert_eq!(LogOptions::parse_level("warning").unwrap(), log::LevelFilter::Warn);
        assert_eq!(LogOptions::parse_level("critical").unwrap(), log::LevelFilter::Error);
        assert_eq!(LogOptions::parse_level("trace").unwrap(), log::LevelFilter::Trace);
    }

    #[test]
    fn parse_level_rejects_garbage() {
        assert!(LogOptions::parse_level("loud").is_err());
    }
}
