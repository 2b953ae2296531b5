use flexi_logger::{DeferredNow, style};
use log::{Level, Record};

/// `LEVEL message`, with the module path added at debug and below.
pub fn cli_format(
    w: &mut dyn std::io::Write,
    _now: &mut DeferredNow,
    record: &Record,
) -> Result<(), std::io::Error> {
    let level = record.level();
    if level >= Level::Debug {
        write!(
            w,
            "{} [{}] {}",
            style(level).paint(level.to_string()),
            record.module_path().unwrap_or("<unnamed>"),
            record.args()
        )
    } else {
        write!(w, "{} {}", style(level).paint(level.to_string()), record.args())
    }
}
