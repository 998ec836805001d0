/// Install colored backtraces for panics, which only ever come from internal defects
pub fn setup() {
    color_backtrace::install();
}
