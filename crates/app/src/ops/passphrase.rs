use std::io::{self, BufRead};
use std::path::Path;

use zeroize::Zeroizing;

/// Reads a passphrase from `file`, or a line from stdin if none is given.
///
/// One trailing newline is stripped either way. Successive stdin reads take
/// successive lines.
pub fn read_passphrase(file: Option<&Path>) -> io::Result<Zeroizing<Vec<u8>>> {
    let mut passphrase = Zeroizing::new(Vec::new());
    match file {
        Some(path) => *passphrase = std::fs::read(path)?,
        None => {
            io::stdin().lock().read_until(b'\n', &mut passphrase)?;
        }
    }
    strip_newline(&mut passphrase);
    if passphrase.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "empty passphrase",
        ));
    }
    Ok(passphrase)
}

fn strip_newline(passphrase: &mut Vec<u8>) {
    if passphrase.last() == Some(&b'\n') {
        passphrase.pop();
        if passphrase.last() == Some(&b'\r') {
            passphrase.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reads_file_and_strips_one_newline() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("pass");
        std::fs::write(&path, b"hello there\r\n").unwrap();
        assert_eq!(&read_passphrase(Some(&path)).unwrap()[..], b"hello there");

        std::fs::write(&path, b"two\n\n").unwrap();
        assert_eq!(&read_passphrase(Some(&path)).unwrap()[..], b"two\n");
    }

    #[test]
    fn test_empty_passphrase_rejected() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("pass");
        std::fs::write(&path, b"\n").unwrap();
        assert_eq!(
            read_passphrase(Some(&path)).unwrap_err().kind(),
            io::ErrorKind::InvalidInput
        );
    }
}
