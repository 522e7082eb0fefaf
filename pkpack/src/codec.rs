//! gzip'd tar containers and the base64 text embedded in bundle stubs
use std::io::{Read, Write};

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use flate2::read::GzDecoder;
use flate2::write::GzEncoder;
use flate2::Compression;
use pkpack_core::Entry;

use crate::{wrap_io_err, Error};

/// Column at which embedded base64 is wrapped
const LINE_WIDTH: usize = 76;

pub fn gzip(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder
        .write_all(data)
        .map_err(wrap_io_err!("Compressing"))?;
    encoder.finish().map_err(wrap_io_err!("Compressing"))
}

pub fn gunzip(data: &[u8]) -> Result<Vec<u8>, Error> {
    let mut out = Vec::new();
    GzDecoder::new(data)
        .read_to_end(&mut out)
        .map_err(|err| Error::decode(format!("gzip: {}", err)))?;
    Ok(out)
}

/// Base64 broken into fixed-width lines, without a trailing newline
pub fn encode_lines(data: &[u8]) -> String {
    let encoded = STANDARD.encode(data);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / LINE_WIDTH + 1);
    for (i, chunk) in encoded.as_bytes().chunks(LINE_WIDTH).enumerate() {
        if i > 0 {
            out.push('\n');
        }
        // Base64 output is ASCII, so every chunk boundary is a char boundary
        out.push_str(&encoded[i * LINE_WIDTH..i * LINE_WIDTH + chunk.len()]);
    }
    out
}

/// Decode base64, ignoring any whitespace (line breaks included)
pub fn decode_text(text: &str) -> Result<Vec<u8>, Error> {
    let compact: String = text.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    STANDARD
        .decode(compact)
        .map_err(|err| Error::decode(format!("base64: {}", err)))
}

/// Bytes of the name field in a tar header
const NAME_FIELD: usize = 100;
/// Name the GNU long-name record is filed under
const LONG_LINK: &[u8] = b"././@LongLink";

/// Check that an entry path can be stored as a tar member name. Paths are
/// written as-is; only names tar cannot carry, or that climb out with `..`,
/// are refused.
fn member_name(path: &str) -> Result<&[u8], Error> {
    if path.is_empty() || path.contains('\0') {
        return Err(Error::decode(format!("entry path cannot be stored: {:?}", path)));
    }
    if path.split('/').any(|segment| segment == "..") {
        return Err(Error::decode(format!("entry path escapes the archive: {}", path)));
    }
    Ok(path.as_bytes())
}

fn set_name(header: &mut tar::Header, name: &[u8]) {
    let field = &mut header.as_old_mut().name;
    let len = name.len().min(NAME_FIELD - 1);
    field[..len].copy_from_slice(&name[..len]);
}

/// Append one regular file. The header name is filled in directly, since
/// `Header::set_path` drops `.` segments and rejects rooted paths.
fn append_member<W: Write>(
    builder: &mut tar::Builder<W>,
    path: &str,
    content: &[u8],
) -> Result<(), Error> {
    let name = member_name(path)?;

    if name.len() >= NAME_FIELD {
        let mut long = tar::Header::new_gnu();
        set_name(&mut long, LONG_LINK);
        long.set_entry_type(tar::EntryType::GNULongName);
        long.set_size(name.len() as u64 + 1);
        long.set_mode(0o644);
        long.set_mtime(0);
        long.set_cksum();
        builder
            .append(&long, name.chain(&[0u8][..]))
            .map_err(wrap_io_err!(path, "Appending tar long name"))?;
    }

    let mut header = tar::Header::new_gnu();
    set_name(&mut header, name);
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(content.len() as u64);
    header.set_mode(0o644);
    header.set_mtime(0);
    header.set_cksum();
    builder
        .append(&header, content)
        .map_err(wrap_io_err!(path, "Appending tar member"))
}

/// Serialize `entries` as a gzip'd tar of regular files, in order
pub fn pack(entries: &[Entry]) -> Result<Vec<u8>, Error> {
    let encoder = GzEncoder::new(Vec::new(), Compression::default());
    let mut builder = tar::Builder::new(encoder);

    for entry in entries {
        append_member(&mut builder, &entry.path, entry.content())?;
    }

    builder
        .into_inner()
        .map_err(wrap_io_err!("Finishing tar"))?
        .finish()
        .map_err(wrap_io_err!("Compressing"))
}

/// Parse a gzip'd tar, keeping regular files in member order
pub fn unpack(targz: &[u8]) -> Result<Vec<Entry>, Error> {
    let mut archive = tar::Archive::new(GzDecoder::new(targz));
    let mut entries = Vec::new();

    let members = archive
        .entries()
        .map_err(|err| Error::decode(format!("tar: {}", err)))?;
    for member in members {
        let mut member = member.map_err(|err| Error::decode(format!("tar: {}", err)))?;
        if !member.header().entry_type().is_file() {
            continue;
        }

        let path = String::from_utf8(member.path_bytes().into_owned())
            .map_err(|err| Error::decode(format!("tar member path: {}", err)))?;
        let size = member.size();
        let mut content = Vec::new();
        member
            .read_to_end(&mut content)
            .map_err(|err| Error::decode(format!("tar member {}: {}", path, err)))?;
        if content.len() as u64 != size {
            return Err(Error::decode(format!(
                "tar member {}: truncated, {} of {} bytes",
                path,
                content.len(),
                size
            )));
        }
        entries.push(Entry::new(path, content));
    }
    Ok(entries)
}

#[cfg(test)]
mod tests {
    use pkpack_core::Entry;

    use super::{decode_text, encode_lines, gunzip, gzip, member_name, pack, unpack};
    use crate::Error;

    #[test]
    fn member_names_are_stored_verbatim() -> Result<(), Error> {
        assert_eq!(member_name("/a/./b.src")?, b"/a/./b.src");
        assert_eq!(member_name("./a.src")?, b"./a.src");
        assert!(member_name("../etc/passwd").is_err());
        assert!(member_name("a/../../b").is_err());
        assert!(member_name("").is_err());
        assert!(member_name("a\0b").is_err());
        Ok(())
    }

    #[test]
    fn rooted_and_dotted_paths_round_trip() -> Result<(), Error> {
        let long = format!("./{}/deep.src", "d".repeat(120));
        let entries = vec![
            Entry::new("./readme.txt", "hi"),
            Entry::new("/abs/a.src", "X = 1"),
            Entry::new(long.as_str(), "deep"),
        ];
        assert_eq!(unpack(&pack(&entries)?)?, entries);
        Ok(())
    }

    #[test]
    fn oversized_member_is_a_decode_error() -> Result<(), Error> {
        let mut header = tar::Header::new_gnu();
        header.set_path("big.bin").unwrap();
        header.set_entry_type(tar::EntryType::Regular);
        header.set_size(1 << 62);
        header.set_mode(0o644);
        header.set_cksum();

        let mut tarball = header.as_bytes().to_vec();
        tarball.extend_from_slice(b"only a few bytes");
        tarball.resize(tarball.len() + 1024, 0);

        assert!(matches!(unpack(&gzip(&tarball)?), Err(Error::Decode { .. })));
        Ok(())
    }

    #[test]
    fn tar_keeps_order_and_bytes() -> Result<(), Error> {
        let long = format!("{}/deep.src", "d".repeat(150));
        let entries = vec![
            Entry::new("z.txt", "last name, first place"),
            Entry::new("a/bin.so", vec![0u8, 159, 146, 150, 255]),
            Entry::new(long.as_str(), ""),
        ];
        assert_eq!(unpack(&pack(&entries)?)?, entries);
        Ok(())
    }

    #[test]
    fn unpack_skips_directories_and_links() -> Result<(), Error> {
        let mut builder = tar::Builder::new(Vec::new());

        let mut dir = tar::Header::new_gnu();
        dir.set_entry_type(tar::EntryType::Directory);
        dir.set_size(0);
        dir.set_mode(0o755);
        builder.append_data(&mut dir, "top/", std::io::empty()).unwrap();

        let mut file = tar::Header::new_gnu();
        file.set_entry_type(tar::EntryType::Regular);
        file.set_size(2);
        file.set_mode(0o644);
        builder.append_data(&mut file, "top/readme.txt", &b"hi"[..]).unwrap();

        let mut link = tar::Header::new_gnu();
        link.set_entry_type(tar::EntryType::Symlink);
        link.set_size(0);
        builder.append_link(&mut link, "top/link", "readme.txt").unwrap();

        let tarball = builder.into_inner().unwrap();
        let entries = unpack(&gzip(&tarball)?)?;
        assert_eq!(entries, vec![Entry::new("top/readme.txt", "hi")]);
        Ok(())
    }

    #[test]
    fn wrapped_base64() -> Result<(), Error> {
        let data: Vec<u8> = (0..=255u8).cycle().take(1000).collect();
        let text = encode_lines(&data);
        assert!(text.lines().all(|line| line.len() <= 76));
        assert!(!text.ends_with('\n'));
        assert_eq!(decode_text(&text)?, data);
        assert_eq!(gunzip(&gzip(&data)?)?, data);
        Ok(())
    }

    #[test]
    fn garbage_is_a_decode_error() {
        assert!(matches!(unpack(b"not gzip at all"), Err(Error::Decode { .. })));
        assert!(matches!(decode_text("@@@"), Err(Error::Decode { .. })));
    }
}
