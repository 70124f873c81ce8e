use md5::Digest;
use md5::Md5;

fn md5_hex(input: &str) -> String {
    hex::encode(Md5::digest(input.as_bytes()))
}

/// `MD5(username + ":mongo:" + password)`, the stored credential digest
pub(crate) fn password_digest(
    username: &str,
    password: &str,
) -> String {
    md5_hex(&format!("{username}:mongo:{password}"))
}

/// `MD5(nonce + username + password_digest)`, sent with `authenticate`
pub(crate) fn auth_key(
    nonce: &str,
    username: &str,
    password: &str,
) -> String {
    md5_hex(&format!("{nonce}{username}{}", password_digest(username, password)))
}
