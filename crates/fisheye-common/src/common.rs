// common.rs — console output

use std::sync::Mutex;

static RD_BUFFER: Mutex<Option<String>> = Mutex::new(None);

/// Begin redirecting console output into a buffer.
pub fn con_begin_redirect() {
    let mut buf = RD_BUFFER.lock().unwrap();
    *buf = Some(String::new());
}

/// End redirect and return the captured output.
pub fn con_end_redirect() -> Option<String> {
    let mut buf = RD_BUFFER.lock().unwrap();
    buf.take()
}

/// General-purpose console print. Prints to stdout, or appends to the
/// redirect buffer if one is active.
pub fn con_printf(msg: &str) {
    {
        let mut buf = RD_BUFFER.lock().unwrap();
        if let Some(ref mut s) = *buf {
            s.push_str(msg);
            return;
        }
    }
    print!("{}", msg);
}
