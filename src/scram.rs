//! Server role of the SCRAM-SHA-256 authentication exchange.
//!
//! Only the `SCRAM-SHA-256` mechanism without channel binding is offered;
//! `-PLUS` variants are not advertised and a client demanding channel
//! binding is rejected.
//!
//! <https://datatracker.ietf.org/doc/html/rfc5802>
//! <https://datatracker.ietf.org/doc/html/rfc7677>

use std::fmt;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use hmac::{Hmac, Mac};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::{Digest, Sha256};
use subtle::ConstantTimeEq;

use crate::error::{Error, Result};

pub const SCRAM_SHA_256: &str = "SCRAM-SHA-256";

// channel binding flag for clients that neither support nor require it
const GS2_HEADER: &str = "n,,";

const SALT_LEN: usize = 16;
const NONCE_LEN: usize = 18;

/// Server-side SCRAM credentials, derived once from the configured password.
///
/// The password itself is not retained; only the salted verifier material
/// needed to run the server side of the exchange is kept.
#[derive(Clone)]
pub struct ScramCredentials {
    salt: Vec<u8>,
    iterations: u32,
    stored_key: [u8; 32],
    server_key: [u8; 32],
}

impl ScramCredentials {
    /// Derive credentials from a password with a fresh random salt.
    pub fn derive(password: &str, iterations: u32) -> Result<Self> {
        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);

        Self::derive_with_salt(password, salt, iterations)
    }

    /// Derive credentials from a password and a caller-provided salt.
    pub fn derive_with_salt(password: &str, salt: Vec<u8>, iterations: u32) -> Result<Self> {
        // Normalize(password), per RFC 5802 § 2.2
        let password = stringprep::saslprep(password)
            .map_err(|_| Error::config("password is not representable in SASLprep"))?;

        // SaltedPassword := Hi(Normalize(password), salt, i)
        let mut salted_password = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut salted_password);

        // ClientKey := HMAC(SaltedPassword, "Client Key")
        let client_key = hmac_sha256(&salted_password, b"Client Key");

        // StoredKey := H(ClientKey)
        let stored_key = Sha256::digest(client_key).into();

        // ServerKey := HMAC(SaltedPassword, "Server Key")
        let server_key = hmac_sha256(&salted_password, b"Server Key");

        Ok(Self {
            salt,
            iterations,
            stored_key,
            server_key,
        })
    }

    pub fn iterations(&self) -> u32 {
        self.iterations
    }
}

// Credentials are key material; keep them out of logs even via {:?}.
impl fmt::Debug for ScramCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScramCredentials")
            .field("iterations", &self.iterations)
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
enum ScramState {
    Initial,

    FirstSent {
        client_first_bare: String,
        server_first: String,
        combined_nonce: String,
    },

    Ended,
}

/// One connection's progress through the exchange.
///
/// Drives the two mechanism messages; the framing around them
/// (`AuthenticationSASL*` / `SASLInitialResponse` / `SASLResponse`) belongs
/// to the connection layer.
pub struct ScramServer {
    credentials: ScramCredentials,
    state: ScramState,
}

impl ScramServer {
    pub fn new(credentials: ScramCredentials) -> Self {
        Self {
            credentials,
            state: ScramState::Initial,
        }
    }

    /// Handle `client-first-message`; returns `server-first-message`.
    pub fn handle_client_first(&mut self, message: &str) -> Result<String> {
        if !matches!(self.state, ScramState::Initial) {
            return Err(auth_err("client-first received out of order"));
        }

        let bare = message
            .strip_prefix(GS2_HEADER)
            .ok_or_else(|| auth_err("channel binding requested but not supported"))?;

        let mut username = None;
        let mut client_nonce = None;

        for attr in bare.split(',') {
            match attr.split_once('=') {
                Some(("n", value)) => username = Some(value),
                Some(("r", value)) => client_nonce = Some(value),
                // extensions are permitted and ignored
                Some(_) => {}
                None => return Err(auth_err("malformed client-first attribute")),
            }
        }

        // The username attribute is not authoritative: like PostgreSQL, the
        // user from the startup packet selects the credentials.
        let _ = username;

        let client_nonce = client_nonce.ok_or_else(|| auth_err("client-first without nonce"))?;

        if client_nonce.is_empty() || client_nonce.contains(',') {
            return Err(auth_err("invalid client nonce"));
        }

        self.first_message(bare.to_owned(), client_nonce, generate_nonce())
    }

    fn first_message(
        &mut self,
        client_first_bare: String,
        client_nonce: &str,
        server_nonce: String,
    ) -> Result<String> {
        let combined_nonce = format!("{client_nonce}{server_nonce}");

        let server_first = format!(
            "r={combined_nonce},s={salt},i={iterations}",
            salt = BASE64.encode(&self.credentials.salt),
            iterations = self.credentials.iterations,
        );

        self.state = ScramState::FirstSent {
            client_first_bare,
            server_first: server_first.clone(),
            combined_nonce,
        };

        Ok(server_first)
    }

    /// Handle `client-final-message`; on success returns the
    /// `server-final-message` (`v=<ServerSignature>`).
    pub fn handle_client_final(&mut self, message: &str) -> Result<String> {
        let (client_first_bare, server_first, combined_nonce) =
            match std::mem::replace(&mut self.state, ScramState::Ended) {
                ScramState::FirstSent {
                    client_first_bare,
                    server_first,
                    combined_nonce,
                } => (client_first_bare, server_first, combined_nonce),

                _ => return Err(auth_err("client-final received out of order")),
            };

        let mut channel_binding = None;
        let mut nonce = None;
        let mut proof = None;
        let mut without_proof_len = 0;

        for attr in message.split(',') {
            match attr.split_once('=') {
                Some(("p", value)) => {
                    if attr.len() >= message.len() {
                        return Err(auth_err("client-final is only a proof"));
                    }

                    proof = Some(value);
                    // everything before ",p=" forms client-final-without-proof
                    without_proof_len = message.len() - attr.len() - 1;
                }
                Some(("c", value)) if proof.is_none() => channel_binding = Some(value),
                Some(("r", value)) if proof.is_none() => nonce = Some(value),
                Some(_) if proof.is_none() => {}
                _ => return Err(auth_err("malformed client-final attribute")),
            }
        }

        let channel_binding =
            channel_binding.ok_or_else(|| auth_err("client-final without channel binding"))?;

        // c= carries the base64 of the GS2 header used in client-first
        if channel_binding != BASE64.encode(GS2_HEADER) {
            return Err(auth_err("channel binding mismatch"));
        }

        let nonce = nonce.ok_or_else(|| auth_err("client-final without nonce"))?;

        if nonce != combined_nonce {
            return Err(auth_err("nonce mismatch"));
        }

        let proof = proof.ok_or_else(|| auth_err("client-final without proof"))?;
        let proof: Vec<u8> = BASE64
            .decode(proof)
            .map_err(|_| auth_err("client proof is not valid base64"))?;

        if proof.len() != 32 {
            return Err(auth_err("client proof has the wrong length"));
        }

        let client_final_without_proof = &message[..without_proof_len];

        // AuthMessage := client-first-message-bare + "," +
        //                server-first-message + "," +
        //                client-final-message-without-proof
        let auth_message =
            format!("{client_first_bare},{server_first},{client_final_without_proof}");

        // ClientSignature := HMAC(StoredKey, AuthMessage)
        let client_signature = hmac_sha256(&self.credentials.stored_key, auth_message.as_bytes());

        // ClientKey := ClientProof XOR ClientSignature
        let mut client_key = [0u8; 32];
        for (out, (proof_byte, signature_byte)) in
            client_key.iter_mut().zip(proof.iter().zip(client_signature))
        {
            *out = proof_byte ^ signature_byte;
        }

        // the proof is valid iff H(ClientKey) == StoredKey; the comparison
        // must not leak how much of the key matched
        let recovered: [u8; 32] = Sha256::digest(client_key).into();

        if !bool::from(recovered.ct_eq(&self.credentials.stored_key)) {
            return Err(auth_err("client proof verification failed"));
        }

        // ServerSignature := HMAC(ServerKey, AuthMessage)
        let server_signature = hmac_sha256(&self.credentials.server_key, auth_message.as_bytes());

        Ok(format!("v={}", BASE64.encode(server_signature)))
    }
}

fn auth_err(detail: &str) -> Error {
    Error::Authentication(detail.into())
}

fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    // HMAC accepts keys of any length
    let mut mac = Hmac::<Sha256>::new_from_slice(key).expect("HMAC can take key of any size");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

// Nonce := printable base64 text from a CSPRNG
fn generate_nonce() -> String {
    let mut raw = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut raw);

    BASE64.encode(raw)
}

#[cfg(test)]
mod tests {
    use super::*;

    // RFC 7677 § 3 example exchange: user "user", password "pencil"
    const RFC_SALT_B64: &str = "W22ZaJ0SNY7soEsUEjb6gQ==";
    const RFC_CLIENT_NONCE: &str = "rOprNGfwEbeRWgbNEkqO";
    const RFC_SERVER_NONCE: &str = "%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0";

    fn rfc_credentials() -> ScramCredentials {
        let salt = BASE64.decode(RFC_SALT_B64).unwrap();
        ScramCredentials::derive_with_salt("pencil", salt, 4096).unwrap()
    }

    fn run_first(server: &mut ScramServer, server_nonce: &str) -> String {
        let client_first = format!("n,,n=user,r={RFC_CLIENT_NONCE}");
        let bare = client_first.strip_prefix("n,,").unwrap().to_owned();

        server
            .first_message(bare, RFC_CLIENT_NONCE, server_nonce.to_owned())
            .unwrap()
    }

    #[test]
    fn it_reproduces_the_rfc_7677_exchange() {
        let mut server = ScramServer::new(rfc_credentials());

        let server_first = run_first(&mut server, RFC_SERVER_NONCE);

        assert_eq!(
            server_first,
            "r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,s=W22ZaJ0SNY7soEsUEjb6gQ==,i=4096"
        );

        let client_final = "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
                            p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=";

        let server_final = server.handle_client_final(client_final).unwrap();

        assert_eq!(server_final, "v=6rriTRBi23WpRR/wtup+mMhUZUn/dB5nLTJRsjl95G4=");
    }

    #[test]
    fn it_rejects_a_wrong_proof() {
        let mut server = ScramServer::new(rfc_credentials());
        run_first(&mut server, RFC_SERVER_NONCE);

        // same shape, flipped proof bytes
        let client_final = "c=biws,r=rOprNGfwEbeRWgbNEkqO%hvYDpWUa2RaTCAfuxFIlj)hNlF$k0,\
                            p=AAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAAA=";

        assert!(server.handle_client_final(client_final).is_err());
    }

    #[test]
    fn it_rejects_a_nonce_mismatch() {
        let mut server = ScramServer::new(rfc_credentials());
        run_first(&mut server, RFC_SERVER_NONCE);

        let client_final =
            "c=biws,r=rOprNGfwEbeRWgbNEkqOsomethingelse,p=dHzbZapWIk4jUhN+Ute9ytag9zjfMHgsqmmiz7AndVQ=";

        assert!(server.handle_client_final(client_final).is_err());
    }

    #[test]
    fn it_rejects_channel_binding_demands() {
        let mut server = ScramServer::new(rfc_credentials());

        assert!(server
            .handle_client_first("p=tls-server-end-point,,n=user,r=abcdef")
            .is_err());
        assert!(server.handle_client_first("y,,n=user,r=abcdef").is_err());
    }

    #[test]
    fn it_rejects_out_of_order_messages() {
        let mut server = ScramServer::new(rfc_credentials());

        assert!(server.handle_client_final("c=biws,r=x,p=eA==").is_err());
    }

    #[test]
    fn it_generates_unique_printable_nonces() {
        let a = generate_nonce();
        let b = generate_nonce();

        assert_ne!(a, b);
        assert!(a.len() >= 16);
        assert!(a.chars().all(|c| c.is_ascii_graphic() && c != ','));
    }

    #[test]
    fn it_runs_a_full_exchange_against_a_real_client_computation() {
        // the client side computed from primitives, independent of the
        // server path
        let password = "s3cret-pw";
        let credentials = ScramCredentials::derive(password, 4096).unwrap();
        let salt = credentials.salt.clone();

        let mut server = ScramServer::new(credentials);

        let client_nonce = "clientnonce0123456789";
        let client_first = format!("n,,n=postgres,r={client_nonce}");
        let server_first = server.handle_client_first(&client_first).unwrap();

        // parse r=, s=, i= out of server-first
        let mut combined_nonce = "";
        let mut iterations = 0u32;
        for attr in server_first.split(',') {
            match attr.split_once('=').unwrap() {
                ("r", v) => combined_nonce = v,
                ("s", v) => assert_eq!(v, BASE64.encode(&salt)),
                ("i", v) => iterations = v.parse().unwrap(),
                _ => unreachable!(),
            }
        }
        assert!(combined_nonce.starts_with(client_nonce));

        let mut salted_password = [0u8; 32];
        pbkdf2::pbkdf2_hmac::<Sha256>(password.as_bytes(), &salt, iterations, &mut salted_password);

        let client_key = hmac_sha256(&salted_password, b"Client Key");
        let stored_key: [u8; 32] = Sha256::digest(client_key).into();

        let without_proof = format!("c=biws,r={combined_nonce}");
        let auth_message = format!(
            "n=postgres,r={client_nonce},{server_first},{without_proof}"
        );

        let client_signature = hmac_sha256(&stored_key, auth_message.as_bytes());
        let proof: Vec<u8> = client_key
            .iter()
            .zip(client_signature)
            .map(|(key, signature)| key ^ signature)
            .collect();

        let client_final = format!("{without_proof},p={}", BASE64.encode(&proof));
        let server_final = server.handle_client_final(&client_final).unwrap();

        // the client verifies the server in turn
        let server_key = hmac_sha256(&salted_password, b"Server Key");
        let server_signature = hmac_sha256(&server_key, auth_message.as_bytes());

        assert_eq!(server_final, format!("v={}", BASE64.encode(server_signature)));
    }
}
