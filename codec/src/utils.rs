use loom_common::{Error, Result};
use minicbor::{Decoder, data::Type, decode};

/// Read an array header, refusing indefinite lengths
pub(crate) fn definite_array(d: &mut Decoder<'_>) -> std::result::Result<u64, decode::Error> {
    d.array()?.ok_or_else(|| decode::Error::message("indefinite-length array"))
}

/// Read a map header, refusing indefinite lengths
pub(crate) fn definite_map(d: &mut Decoder<'_>) -> std::result::Result<u64, decode::Error> {
    d.map()?.ok_or_else(|| decode::Error::message("indefinite-length map"))
}

/// Read a byte string, refusing indefinite (chunked) encodings
pub(crate) fn definite_bytes<'b>(
    d: &mut Decoder<'b>,
) -> std::result::Result<&'b [u8], decode::Error> {
    match d.datatype()? {
        Type::Bytes => d.bytes(),
        other => Err(decode::Error::type_mismatch(other)),
    }
}

/// Run `read` over the whole of `bytes`, then insist that nothing follows and that `write`
/// reproduces the input exactly
pub(crate) fn decode_canonical<T>(
    bytes: &[u8],
    what: &str,
    read: impl FnOnce(&mut Decoder<'_>) -> std::result::Result<T, decode::Error>,
    write: impl FnOnce(&T) -> Result<Vec<u8>>,
) -> Result<T> {
    let mut decoder = Decoder::new(bytes);
    let value = read(&mut decoder)
        .map_err(|e| Error::MalformedEncoding(format!("{what}: {e}")))?;

    let consumed = decoder.position();
    if consumed != bytes.len() {
        return Err(Error::MalformedEncoding(format!(
            "{what}: {} trailing bytes",
            bytes.len() - consumed
        )));
    }

    if write(&value)? != bytes {
        tracing::debug!("{what} decoded but re-encodes differently");
        return Err(Error::MalformedEncoding(format!("{what}: not canonically encoded")));
    }

    Ok(value)
}
