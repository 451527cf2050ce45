// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Initial terminal state for a freshly allocated PTY.

use nix::pty::Winsize;

const fn ctrl(c: u8) -> libc::cc_t {
    c - b'A' + 1
}

// VEOL/VEOL2 start out disabled.
const DISABLED: libc::cc_t = 0xff;

/// The termios/winsize pair handed to `openpty`. Canonical, echoing,
/// 8-bit-clean line discipline; UTF-8 input handling only when the launch
/// request asks for it.
pub struct TtyState {
    pub term: libc::termios,
    pub win: Winsize,
}

impl TtyState {
    pub fn new(width: i32, height: i32, is_utf8: bool) -> TtyState {
        // Safety: termios is plain old data; every field we rely on is
        // assigned below.
        let mut term: libc::termios = unsafe { std::mem::zeroed() };

        term.c_iflag = libc::ICRNL
            | libc::IXON
            | libc::IXANY
            | libc::IMAXBEL
            | libc::BRKINT
            | if is_utf8 { libc::IUTF8 } else { 0 };
        term.c_oflag = libc::OPOST | libc::ONLCR;
        term.c_cflag = libc::CREAD | libc::CS8 | libc::HUPCL;
        term.c_lflag = libc::ICANON
            | libc::ISIG
            | libc::IEXTEN
            | libc::ECHO
            | libc::ECHOE
            | libc::ECHOK
            | libc::ECHOKE
            | libc::ECHOCTL;

        term.c_cc[libc::VEOF] = ctrl(b'D');
        term.c_cc[libc::VEOL] = DISABLED;
        term.c_cc[libc::VEOL2] = DISABLED;
        term.c_cc[libc::VERASE] = 0x7f; // DEL
        term.c_cc[libc::VWERASE] = ctrl(b'W');
        term.c_cc[libc::VKILL] = ctrl(b'U');
        term.c_cc[libc::VREPRINT] = ctrl(b'R');
        term.c_cc[libc::VINTR] = ctrl(b'C');
        term.c_cc[libc::VQUIT] = 0x1c; // Control+backslash
        term.c_cc[libc::VSUSP] = ctrl(b'Z');
        term.c_cc[libc::VSTART] = ctrl(b'Q');
        term.c_cc[libc::VSTOP] = ctrl(b'S');
        term.c_cc[libc::VLNEXT] = ctrl(b'V');
        term.c_cc[libc::VDISCARD] = ctrl(b'O');
        term.c_cc[libc::VMIN] = 1;
        term.c_cc[libc::VTIME] = 0;
        #[cfg(target_os = "macos")]
        {
            term.c_cc[libc::VDSUSP] = ctrl(b'Y');
            term.c_cc[libc::VSTATUS] = ctrl(b'T');
        }

        // Safety: term is a valid termios and B38400 is a valid speed.
        unsafe {
            libc::cfsetispeed(&mut term, libc::B38400);
            libc::cfsetospeed(&mut term, libc::B38400);
        }

        let win = Winsize {
            ws_row: height as u16,
            ws_col: width as u16,
            ws_xpixel: 0,
            ws_ypixel: 0,
        };

        TtyState { term, win }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn utf8_flag_follows_request() {
        let with = TtyState::new(80, 24, true);
        let without = TtyState::new(80, 24, false);
        assert_ne!(with.term.c_iflag & libc::IUTF8, 0);
        assert_eq!(without.term.c_iflag & libc::IUTF8, 0);
        // Everything else identical.
        assert_eq!(
            with.term.c_iflag & !libc::IUTF8,
            without.term.c_iflag & !libc::IUTF8
        );
    }

    #[test]
    fn canonical_line_discipline() {
        let tty = TtyState::new(80, 24, true);
        assert_ne!(tty.term.c_lflag & libc::ICANON, 0);
        assert_ne!(tty.term.c_lflag & libc::ECHO, 0);
        assert_ne!(tty.term.c_oflag & libc::ONLCR, 0);
        assert_eq!(tty.term.c_cc[libc::VEOF], 4); // ^D
        assert_eq!(tty.term.c_cc[libc::VINTR], 3); // ^C
        assert_eq!(tty.term.c_cc[libc::VERASE], 0x7f);
        assert_eq!(tty.term.c_cc[libc::VMIN], 1);
        assert_eq!(tty.term.c_cc[libc::VTIME], 0);
    }

    #[test]
    fn window_size_comes_from_the_request() {
        let tty = TtyState::new(132, 43, false);
        assert_eq!(tty.win.ws_col, 132);
        assert_eq!(tty.win.ws_row, 43);
        assert_eq!(tty.win.ws_xpixel, 0);
        assert_eq!(tty.win.ws_ypixel, 0);
    }
}
