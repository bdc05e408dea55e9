//! `cbactions keygen`

use std::io::{self, Write};

use anyhow::Result;
use zeroize::Zeroizing;

use cbactions_crypto::{LocalCustodian, OneTimeIdentity};

pub fn run(custodian: bool) -> Result<i32> {
    let text = if custodian {
        custodian_key_file(&LocalCustodian::generate())
    } else {
        identity_file(&OneTimeIdentity::generate())
    };
    let mut out = io::stdout().lock();
    out.write_all(text.as_bytes())?;
    out.flush()?;
    Ok(0)
}

/// Secret text with the public recipient as a comment line.
fn identity_file(identity: &OneTimeIdentity) -> Zeroizing<String> {
    Zeroizing::new(format!(
        "# recipient: {}\n{}\n",
        identity.recipient(),
        identity.to_secret_text().as_str()
    ))
}

fn custodian_key_file(custodian: &LocalCustodian) -> Zeroizing<String> {
    Zeroizing::new(format!("{}\n", custodian.to_base64().as_str()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use cbactions_crypto::parse_identities;

    #[test]
    fn test_identity_file_parses_back() {
        let identity = OneTimeIdentity::generate();
        let text = identity_file(&identity);
        assert!(text.starts_with("# recipient: age1"));

        let parsed = parse_identities(&text).unwrap();
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].recipient(), identity.recipient());
    }

    #[test]
    fn test_custodian_key_file_loads_back() {
        let text = custodian_key_file(&LocalCustodian::generate());
        assert!(LocalCustodian::from_base64(text.trim()).is_ok());
    }
}
