//! SRP-6a mutual authentication
//!
//! Both ends of a Ghost connection prove knowledge of shared verifier
//! material without ever sending a secret, and derive the same master
//! key. The 32-byte AES-256 session key is the truncation of that
//! hash-wide master key.
//!
//! First contact registers: the client sends its identifier, salt, group
//! and verifier alongside its public value, and the server persists the
//! record. Reconnects send only the identifier; the server answers with
//! a challenge built from the stored record.

use num_bigint::{BigUint, RandBigInt};
use num_traits::Zero;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256, Sha512};
use thiserror::Error;
use tokio::io::{AsyncRead, AsyncWrite};

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;

use super::protocol::{read_payload, write_payload, CodecError, GhostMessage};
use crate::storage::PeerStore;

/// RFC 5054 2048-bit group prime
const PRIME_2048_HEX: &str = "\
AC6BDB41324A9A9BF166DE5E1389582FAF72B6651987EE07FC3192943DB56050\
A37329CBB4A099ED8193E0757767A13DD52312AB4B03310DCD7F48A9DA04FD50\
E8083969EDB767B0CF6095179A163AB3661A05FBD5FAAAE82918A9962F0B93B8\
55F97993EC975EEAA80D740ADBF4FF747359D041D5C33EA71D281E446B14773B\
CA97B43A23FB801676BD207A436C6481F1D2B9078717461A5B9D32E688F87748\
544523B524B0D57D5EA77A2775D2ECFA032CFBDBF52FB3786160279004E57AE6\
AF874E7303CE53299CCC041C7BC308D82A5698F3A8D0C38271AE35F8E9DBFBB6\
94B5C803D89F7AE435DE236D525F54759B65E372FCD68EF20FA7111F9E4AFF73";

/// RFC 5054 generator for the 2048-bit group
const GENERATOR: u8 = 2;

/// Salt length in bytes
const SALT_LEN: usize = 16;

/// Secret length in bytes (client-side only, never transmitted)
const SECRET_LEN: usize = 32;

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Unexpected handshake message '{0}'")]
    UnexpectedMessage(String),
    #[error("Missing handshake parameter '{0}'")]
    MissingParam(&'static str),
    #[error("Bad handshake encoding: {0}")]
    BadEncoding(String),
    #[error("Unknown peer '{0}'")]
    UnknownPeer(String),
    #[error("Invalid public value")]
    InvalidPublicValue,
    #[error("Peer rejected the handshake")]
    Rejected,
    #[error("Peer store failure: {0}")]
    Store(String),
    #[error(transparent)]
    Codec(#[from] CodecError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Persisted SRP material for a registered peer (server side)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerRecord {
    pub identifier: String,
    pub salt: Vec<u8>,
    pub prime: Vec<u8>,
    pub generator: Vec<u8>,
    pub verifier: Vec<u8>,
}

/// Our own registration with a remote peer (client side)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OwnCredential {
    pub identifier: String,
    pub salt: Vec<u8>,
    pub secret: Vec<u8>,
}

impl OwnCredential {
    /// Fresh random identity for first contact with a peer
    pub fn generate() -> Self {
        let mut rng = rand::thread_rng();
        let mut id_bytes = [0u8; 16];
        rng.fill_bytes(&mut id_bytes);
        let mut salt = vec![0u8; SALT_LEN];
        rng.fill_bytes(&mut salt);
        let mut secret = vec![0u8; SECRET_LEN];
        rng.fill_bytes(&mut secret);
        Self {
            identifier: hex::encode(id_bytes),
            salt,
            secret,
        }
    }
}

/// An SRP group (prime, generator)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SrpGroup {
    n: BigUint,
    g: BigUint,
}

impl SrpGroup {
    /// The standard group every GHOST node offers
    pub fn standard() -> Self {
        Self {
            n: BigUint::parse_bytes(PRIME_2048_HEX.as_bytes(), 16)
                .unwrap_or_else(BigUint::zero),
            g: BigUint::from(GENERATOR),
        }
    }

    /// Group from wire bytes (big-endian)
    pub fn from_bytes(prime: &[u8], generator: &[u8]) -> Result<Self, AuthError> {
        let n = BigUint::from_bytes_be(prime);
        let g = BigUint::from_bytes_be(generator);
        if n.is_zero() || g.is_zero() {
            return Err(AuthError::BadEncoding("zero group parameter".to_string()));
        }
        Ok(Self { n, g })
    }

    pub fn prime_bytes(&self) -> Vec<u8> {
        self.n.to_bytes_be()
    }

    pub fn generator_bytes(&self) -> Vec<u8> {
        self.g.to_bytes_be()
    }

    fn pad(&self, value: &BigUint) -> Vec<u8> {
        let width = self.prime_bytes().len();
        let bytes = value.to_bytes_be();
        let mut padded = vec![0u8; width.saturating_sub(bytes.len())];
        padded.extend_from_slice(&bytes);
        padded
    }

    /// k = H(N ‖ PAD(g))
    fn multiplier(&self) -> BigUint {
        let mut hasher = Sha256::new();
        hasher.update(self.prime_bytes());
        hasher.update(self.pad(&self.g));
        BigUint::from_bytes_be(&hasher.finalize())
    }

    /// u = H(PAD(A) ‖ PAD(B))
    fn scrambler(&self, a_pub: &BigUint, b_pub: &BigUint) -> BigUint {
        let mut hasher = Sha256::new();
        hasher.update(self.pad(a_pub));
        hasher.update(self.pad(b_pub));
        BigUint::from_bytes_be(&hasher.finalize())
    }
}

/// x = H(salt ‖ H(identifier ‖ ":" ‖ secret))
fn private_exponent(identifier: &str, salt: &[u8], secret: &[u8]) -> BigUint {
    let mut inner = Sha256::new();
    inner.update(identifier.as_bytes());
    inner.update(b":");
    inner.update(secret);
    let mut outer = Sha256::new();
    outer.update(salt);
    outer.update(inner.finalize());
    BigUint::from_bytes_be(&outer.finalize())
}

/// v = g^x mod N
pub fn compute_verifier(group: &SrpGroup, credential: &OwnCredential) -> Vec<u8> {
    let x = private_exponent(&credential.identifier, &credential.salt, &credential.secret);
    group.g.modpow(&x, &group.n).to_bytes_be()
}

/// Session key = first 32 bytes of SHA-512(PAD(S))
fn session_key_from(group: &SrpGroup, premaster: &BigUint) -> [u8; 32] {
    let mut hasher = Sha512::new();
    hasher.update(group.pad(premaster));
    let master = hasher.finalize();
    let mut key = [0u8; 32];
    key.copy_from_slice(&master[..32]);
    key
}

/// Server half of the exchange
pub struct SrpServer {
    group: SrpGroup,
    verifier: BigUint,
    b: BigUint,
    b_pub: BigUint,
}

impl SrpServer {
    pub fn new(group: SrpGroup, verifier: &[u8]) -> Self {
        let verifier = BigUint::from_bytes_be(verifier);
        let b = rand::thread_rng().gen_biguint_below(&group.n);
        let k = group.multiplier();
        // B = k*v + g^b mod N
        let b_pub = (&k * &verifier + group.g.modpow(&b, &group.n)) % &group.n;
        Self {
            group,
            verifier,
            b,
            b_pub,
        }
    }

    pub fn public_value(&self) -> Vec<u8> {
        self.b_pub.to_bytes_be()
    }

    /// Derive the session key from the client public value
    pub fn session_key(&self, client_public: &[u8]) -> Result<[u8; 32], AuthError> {
        let a_pub = BigUint::from_bytes_be(client_public);
        if (&a_pub % &self.group.n).is_zero() {
            return Err(AuthError::InvalidPublicValue);
        }
        let u = self.group.scrambler(&a_pub, &self.b_pub);
        if u.is_zero() {
            return Err(AuthError::InvalidPublicValue);
        }
        // S = (A * v^u)^b mod N
        let base = (&a_pub * self.verifier.modpow(&u, &self.group.n)) % &self.group.n;
        let premaster = base.modpow(&self.b, &self.group.n);
        Ok(session_key_from(&self.group, &premaster))
    }
}

/// Client half of the exchange
pub struct SrpClient {
    group: SrpGroup,
    x: BigUint,
    a: BigUint,
    a_pub: BigUint,
}

impl SrpClient {
    pub fn new(group: SrpGroup, credential: &OwnCredential) -> Self {
        let x = private_exponent(&credential.identifier, &credential.salt, &credential.secret);
        let a = rand::thread_rng().gen_biguint_below(&group.n);
        let a_pub = group.g.modpow(&a, &group.n);
        Self { group, x, a, a_pub }
    }

    pub fn public_value(&self) -> Vec<u8> {
        self.a_pub.to_bytes_be()
    }

    /// Derive the session key from the server public value
    pub fn session_key(&self, server_public: &[u8]) -> Result<[u8; 32], AuthError> {
        let b_pub = BigUint::from_bytes_be(server_public);
        if (&b_pub % &self.group.n).is_zero() {
            return Err(AuthError::InvalidPublicValue);
        }
        let u = self.group.scrambler(&self.a_pub, &b_pub);
        if u.is_zero() {
            return Err(AuthError::InvalidPublicValue);
        }
        let k = self.group.multiplier();
        // S = (B - k*g^x)^(a + u*x) mod N
        let kgx = (&k * self.group.g.modpow(&self.x, &self.group.n)) % &self.group.n;
        let base = (&b_pub % &self.group.n + &self.group.n - kgx) % &self.group.n;
        let exponent = &self.a + &u * &self.x;
        let premaster = base.modpow(&exponent, &self.group.n);
        Ok(session_key_from(&self.group, &premaster))
    }
}

fn b64_param(msg: &GhostMessage, name: &'static str) -> Result<Vec<u8>, AuthError> {
    let raw = msg.get_str(name).ok_or(AuthError::MissingParam(name))?;
    BASE64
        .decode(raw)
        .map_err(|e| AuthError::BadEncoding(format!("{}: {}", name, e)))
}

/// Accept an inbound handshake; on any failure send `INVALID_AUTH` and
/// surface the error so the caller closes the socket
pub async fn authenticate_inbound<S>(
    stream: &mut S,
    store: &PeerStore,
) -> Result<[u8; 32], AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    match inbound_exchange(stream, store).await {
        Ok(key) => Ok(key),
        Err(e) => {
            let reject = GhostMessage::new("INVALID_AUTH");
            if let Ok(bytes) = reject.encode() {
                let _ = write_payload(stream, &bytes).await;
            }
            Err(e)
        }
    }
}

async fn inbound_exchange<S>(stream: &mut S, store: &PeerStore) -> Result<[u8; 32], AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let first = GhostMessage::decode(&read_payload(stream).await?)?;
    if first.msg_type != "HANDSHAKE" {
        return Err(AuthError::UnexpectedMessage(first.msg_type));
    }
    let identifier = first
        .get_str("IDENTIFIER")
        .ok_or(AuthError::MissingParam("IDENTIFIER"))?
        .to_string();

    if first.params.contains_key("VERIFIER") {
        // New-peer registration: group and verifier arrive in the frame
        let salt = b64_param(&first, "SALT")?;
        let prime = b64_param(&first, "PRIME")?;
        let generator = b64_param(&first, "GENERATOR")?;
        let verifier = b64_param(&first, "VERIFIER")?;
        let client_public = b64_param(&first, "PUBLIC_VALUE")?;

        let group = SrpGroup::from_bytes(&prime, &generator)?;
        let server = SrpServer::new(group, &verifier);

        let auth = GhostMessage::new("HANDSHAKE_AUTH")
            .with_str("PUBLIC_VALUE", BASE64.encode(server.public_value()));
        write_payload(stream, &auth.encode()?).await?;

        let key = server.session_key(&client_public)?;
        store
            .put_record(&PeerRecord {
                identifier,
                salt,
                prime,
                generator,
                verifier,
            })
            .map_err(|e| AuthError::Store(e.to_string()))?;
        Ok(key)
    } else {
        // Known peer: challenge from the stored record
        let record = store
            .get_record(&identifier)
            .map_err(|e| AuthError::Store(e.to_string()))?
            .ok_or_else(|| AuthError::UnknownPeer(identifier.clone()))?;

        let group = SrpGroup::from_bytes(&record.prime, &record.generator)?;
        let server = SrpServer::new(group, &record.verifier);

        let challenge = GhostMessage::new("HANDSHAKE_CHALLENGE")
            .with_str("SALT", BASE64.encode(&record.salt))
            .with_str("PRIME", BASE64.encode(&record.prime))
            .with_str("GENERATOR", BASE64.encode(&record.generator))
            .with_str("PUBLIC_VALUE", BASE64.encode(server.public_value()));
        write_payload(stream, &challenge.encode()?).await?;

        let reply = GhostMessage::decode(&read_payload(stream).await?)?;
        if reply.msg_type != "HANDSHAKE_AUTH" {
            return Err(AuthError::UnexpectedMessage(reply.msg_type));
        }
        let client_public = b64_param(&reply, "PUBLIC_VALUE")?;
        server.session_key(&client_public)
    }
}

/// Run an outbound handshake against `peername`
///
/// Registers on first contact and persists the credential; reconnects
/// use the identifier-only flow.
pub async fn authenticate_outbound<S>(
    stream: &mut S,
    store: &PeerStore,
    peername: &str,
) -> Result<[u8; 32], AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let known = store
        .get_credential(peername)
        .map_err(|e| AuthError::Store(e.to_string()))?;

    match known {
        Some(credential) => outbound_reconnect(stream, &credential).await,
        None => {
            let credential = OwnCredential::generate();
            let key = outbound_register(stream, &credential).await?;
            store
                .put_credential(peername, &credential)
                .map_err(|e| AuthError::Store(e.to_string()))?;
            Ok(key)
        }
    }
}

async fn outbound_register<S>(
    stream: &mut S,
    credential: &OwnCredential,
) -> Result<[u8; 32], AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let group = SrpGroup::standard();
    let verifier = compute_verifier(&group, credential);
    let client = SrpClient::new(group.clone(), credential);

    let hello = GhostMessage::new("HANDSHAKE")
        .with_str("IDENTIFIER", credential.identifier.clone())
        .with_str("SALT", BASE64.encode(&credential.salt))
        .with_str("PRIME", BASE64.encode(group.prime_bytes()))
        .with_str("GENERATOR", BASE64.encode(group.generator_bytes()))
        .with_str("VERIFIER", BASE64.encode(&verifier))
        .with_str("PUBLIC_VALUE", BASE64.encode(client.public_value()))
        .with_int("PROTOCOL_VERSION", crate::constants::GHOST_PROTOCOL_VERSION as i64);
    write_payload(stream, &hello.encode()?).await?;

    let reply = GhostMessage::decode(&read_payload(stream).await?)?;
    match reply.msg_type.as_str() {
        "HANDSHAKE_AUTH" => {
            let server_public = b64_param(&reply, "PUBLIC_VALUE")?;
            client.session_key(&server_public)
        }
        "INVALID_AUTH" => Err(AuthError::Rejected),
        other => Err(AuthError::UnexpectedMessage(other.to_string())),
    }
}

async fn outbound_reconnect<S>(
    stream: &mut S,
    credential: &OwnCredential,
) -> Result<[u8; 32], AuthError>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let hello = GhostMessage::new("HANDSHAKE")
        .with_str("IDENTIFIER", credential.identifier.clone())
        .with_int("PROTOCOL_VERSION", crate::constants::GHOST_PROTOCOL_VERSION as i64);
    write_payload(stream, &hello.encode()?).await?;

    let challenge = GhostMessage::decode(&read_payload(stream).await?)?;
    match challenge.msg_type.as_str() {
        "HANDSHAKE_CHALLENGE" => {}
        "INVALID_AUTH" => return Err(AuthError::Rejected),
        other => return Err(AuthError::UnexpectedMessage(other.to_string())),
    }
    let prime = b64_param(&challenge, "PRIME")?;
    let generator = b64_param(&challenge, "GENERATOR")?;
    let server_public = b64_param(&challenge, "PUBLIC_VALUE")?;
    // The salt in the challenge must match what we registered with; our
    // private exponent already binds it
    let group = SrpGroup::from_bytes(&prime, &generator)?;
    let client = SrpClient::new(group, credential);

    let reply = GhostMessage::new("HANDSHAKE_AUTH")
        .with_str("PUBLIC_VALUE", BASE64.encode(client.public_value()));
    write_payload(stream, &reply.encode()?).await?;

    client.session_key(&server_public)
}
