//! Integration tests for complete SQRL exchanges.
//!
//! These tests drive both sides through the public API:
//! - First contact, account creation and the confirmed login
//! - Identity rotation with previous identity and unlock request signatures
//! - Rejection of tampered or mismatched bodies

use sqrl_protocol::encoding::{split_key_value, FIELD_SEPARATOR};
use sqrl_protocol::{
    identity_lock_key, CipherTool, ClientBody, Ed25519Provider, ProtocolError, ServerBody,
    ServerParameter, ServerUnlockKeys, SqrlProtocol, TransactionFlags, CMD_CREATE, CMD_SETKEY,
    CMD_SETLOCK, KEY_LENGTH,
};

const SITE_KEY: &str = "sqrl-login.appspot.com";
const SIGNATURE_URI: &str =
    "sqrl-login.appspot.com:443/sqrl/auth?nut=5b216fa381b7769e1e88624ff685686c";
const NUT: &str = "5b216fa381b7769e1e88624ff685686c";
const FRIENDLY_NAME: &str = "Unit Test";

/// Fixed identity: an identity unlock key and a master key.
struct Identity {
    identity_unlock_key: [u8; KEY_LENGTH],
    master_key: [u8; KEY_LENGTH],
}

fn key(hex_value: &str) -> [u8; KEY_LENGTH] {
    hex::decode(hex_value).unwrap().try_into().unwrap()
}

fn identities() -> Vec<Identity> {
    [
        (
            "7d675a9efd8402d85c66469437fd0c5ae562197b3f8c59c61288d911ee0d6b48",
            "0ae54792844c64a79d8c899554d0929755ee043e33ab35537fe3c3d9c483e69b",
        ),
        (
            "50b2c609e61dbc70ef4fb5357c96fcedc250c8dddf50c44b17c2d8e6b89dd376",
            "85b7c6424d71ba6b9ab1d5f103538a2b7c946246cdc02002e17e22b86d9e8c66",
        ),
        (
            "5a1fe48f6020c2b44586534dcf9660ed521a08c500b4f31b0cc972ff64ddd6c3",
            "26a27228d509db13e9f73b3010db66ca4e13156e5a1f6abf89ebdd7a65269bd8",
        ),
    ]
    .into_iter()
    .map(|(iuk, master)| Identity {
        identity_unlock_key: key(iuk),
        master_key: key(master),
    })
    .collect()
}

fn protocol() -> SqrlProtocol {
    SqrlProtocol::builder()
        .ecc_provider(Ed25519Provider::new())
        .mac_provider(CipherTool::new())
        .build()
        .unwrap()
}

/// The `suk`/`vuk` a client publishes for `identity`.
fn create_server_keys(protocol: &SqrlProtocol, identity: &Identity) -> ServerUnlockKeys {
    let ecc = protocol.ecc_provider();
    let random_lock_key = CipherTool::new().random_key();
    let ilk = identity_lock_key(ecc, &identity.identity_unlock_key);
    ServerUnlockKeys::derive(ecc, &random_lock_key, &ilk).unwrap()
}

fn read_client(protocol: &SqrlProtocol, body: &ClientBody) -> ClientBody {
    protocol
        .read_client_body()
        .from_body(body.encoded())
        .unwrap()
        .verified()
        .unwrap()
}

fn read_server(protocol: &SqrlProtocol, body: &ServerBody) -> ServerBody {
    protocol
        .read_server_body()
        .from_body(body.encoded())
        .unwrap()
        .parsed()
        .unwrap()
}

// =============================================================================
// Account Creation Flow
// =============================================================================

fn authenticate(protocol: &SqrlProtocol, identity: &Identity) -> ClientBody {
    let original = protocol
        .authenticate(&identity.master_key, SITE_KEY)
        .build_request(SIGNATURE_URI)
        .unwrap();
    let parsed = read_client(protocol, &original);

    assert!(parsed.server_parameter().is_uri());
    assert_eq!(parsed.identity_signature().as_bytes().len(), 64);
    assert!(parsed.client_parameter().server_unlock_key().is_none());
    assert!(parsed.client_parameter().verify_unlock_key().is_none());
    assert_eq!(parsed, original);

    original
}

fn allow_account_creation(protocol: &SqrlProtocol, request: &ClientBody) -> ServerBody {
    let original = protocol
        .answer_client(request, TransactionFlags::ACCOUNT_CREATION_ALLOWED)
        .unwrap()
        .friendly_name(FRIENDLY_NAME)
        .build()
        .unwrap()
        .into_server_body();
    let parsed = read_server(protocol, &original);

    let parameter = parsed.server_parameter();
    assert_eq!(parameter.friendly_name(), Some(FRIENDLY_NAME));
    assert_eq!(parameter.nut().unwrap(), request.server_parameter().nut().unwrap());
    assert_eq!(parameter.nut().unwrap(), NUT);
    assert!(parameter.has_flag(TransactionFlags::ACCOUNT_CREATION_ALLOWED));
    assert!(parameter.server_unlock_key().is_none());
    assert!(parameter.verify_unlock_key().is_none());
    assert_eq!(parsed, original);

    original
}

fn create_account(protocol: &SqrlProtocol, identity: &Identity, server_body: &ServerBody) -> ClientBody {
    let keys = create_server_keys(protocol, identity);

    let original = protocol
        .answer_server(&identity.master_key, SITE_KEY, server_body)
        .command(CMD_CREATE)
        .new_server_keys(&keys.server_unlock_key, &keys.verify_unlock_key)
        .build_response_to(server_body)
        .unwrap();
    let parsed = read_client(protocol, &original);

    assert!(!parsed.server_parameter().is_uri());
    assert_eq!(
        parsed.server_parameter().nut().unwrap(),
        server_body.server_parameter().nut().unwrap()
    );
    assert_eq!(
        parsed.client_parameter().commands(),
        vec![CMD_CREATE, CMD_SETKEY, CMD_SETLOCK]
    );
    assert_eq!(
        parsed.client_parameter().server_unlock_key(),
        Some(&keys.server_unlock_key[..])
    );
    assert_eq!(
        parsed.client_parameter().verify_unlock_key(),
        Some(&keys.verify_unlock_key[..])
    );
    assert_eq!(parsed, original);

    original
}

fn account_created(protocol: &SqrlProtocol, request: &ClientBody) -> ServerBody {
    let client = request.client_parameter();
    let (Some(suk), Some(vuk)) = (client.server_unlock_key(), client.verify_unlock_key()) else {
        panic!("create request carries no unlock keys");
    };

    let original = protocol
        .answer_client(request, TransactionFlags::ID_MATCH)
        .unwrap()
        .friendly_name(FRIENDLY_NAME)
        .stored_keys(suk, vuk)
        .build()
        .unwrap()
        .into_server_body();
    let parsed = read_server(protocol, &original);

    let parameter = parsed.server_parameter();
    assert_eq!(parameter.friendly_name(), Some(FRIENDLY_NAME));
    assert_eq!(parameter.nut().unwrap(), NUT);
    assert_eq!(parameter.server_unlock_key().map(|k| k.len()), Some(32));
    assert_eq!(parameter.verify_unlock_key().map(|k| k.len()), Some(32));
    assert_eq!(parsed, original);

    original
}

#[test]
fn test_simple_authentication() {
    let protocol = protocol();

    for identity in identities() {
        let request = authenticate(&protocol, &identity);
        let challenge = allow_account_creation(&protocol, &request);
        let create = create_account(&protocol, &identity, &challenge);
        account_created(&protocol, &create);
    }
}

#[test]
fn test_identity_keys_are_stable_across_requests() {
    let protocol = protocol();

    for identity in identities() {
        let first = authenticate(&protocol, &identity);
        let second = authenticate(&protocol, &identity);
        assert_eq!(
            first.client_parameter().identity_key(),
            second.client_parameter().identity_key()
        );
        // Ed25519 is deterministic as well
        assert_eq!(first, second);
    }
}

#[test]
fn test_identities_are_distinct() {
    let protocol = protocol();
    let keys: Vec<_> = identities()
        .iter()
        .map(|identity| *authenticate(&protocol, identity).client_parameter().identity_key())
        .collect();

    assert_ne!(keys[0], keys[1]);
    assert_ne!(keys[1], keys[2]);
    assert_ne!(keys[0], keys[2]);
}

// =============================================================================
// Identity Rotation
// =============================================================================

#[test]
fn test_identity_rotation_with_unlock_request() {
    let protocol = protocol();
    let identities = identities();
    let old = &identities[0];
    let new_master_key = identities[1].master_key;

    let request = authenticate(&protocol, old);
    let challenge = allow_account_creation(&protocol, &request);
    let create = create_account(&protocol, old, &challenge);
    let confirmed = account_created(&protocol, &create);
    let stored = confirmed.server_parameter();
    let (stored_suk, stored_vuk) = (
        stored.server_unlock_key().unwrap(),
        stored.verify_unlock_key().unwrap(),
    );

    // New master key, proven with the old identity and the unlock key
    let replacement_keys = create_server_keys(&protocol, old);
    let rotation = protocol
        .answer_server(&new_master_key, SITE_KEY, &confirmed)
        .previous_master_key(&old.master_key)
        .identity_unlock_key(&old.identity_unlock_key)
        .new_server_keys(
            &replacement_keys.server_unlock_key,
            &replacement_keys.verify_unlock_key,
        )
        .build_response_to(&confirmed)
        .unwrap();

    assert!(rotation.previous_identity_signature().is_some());
    assert!(rotation.unlock_request_signature().is_some());
    assert_eq!(
        rotation.client_parameter().previous_identity_key(),
        Some(&create.client_parameter().identity_key()[..])
    );

    let parsed = protocol
        .read_client_body()
        .from_body(rotation.encoded())
        .unwrap()
        .stored_keys(&stored_suk, &stored_vuk)
        .verified()
        .unwrap();
    assert_eq!(parsed, rotation);

    let answer = protocol
        .answer_client_all(
            &parsed,
            [TransactionFlags::ID_MATCH, TransactionFlags::PREVIOUS_ID_MATCH],
        )
        .unwrap()
        .build()
        .unwrap();
    assert!(answer.has_flag(TransactionFlags::PREVIOUS_ID_MATCH));
    assert_eq!(answer.nut().unwrap(), NUT);
}

#[test]
fn test_unlock_request_against_other_account_fails() {
    let protocol = protocol();
    let identities = identities();
    let owner = &identities[0];
    let intruder = &identities[2];

    let keys = create_server_keys(&protocol, owner);
    let server_body = ServerParameter::builder(NUT, TransactionFlags::ID_MATCH)
        .stored_keys(&keys.server_unlock_key, &keys.verify_unlock_key)
        .build()
        .unwrap()
        .into_server_body();

    let err = protocol
        .answer_server(&intruder.master_key, SITE_KEY, &server_body)
        .identity_unlock_key(&intruder.identity_unlock_key)
        .build_response_to(&server_body)
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Protocol(_)));
}

// =============================================================================
// Rejection
// =============================================================================

#[test]
fn test_swapped_identity_key_fails_verification() {
    let protocol = protocol();
    let identities = identities();
    let first = authenticate(&protocol, &identities[0]);
    let second = authenticate(&protocol, &identities[1]);

    let mut fields = split_key_value(first.encoded(), FIELD_SEPARATOR).unwrap();
    let other_client = split_key_value(second.encoded(), FIELD_SEPARATOR).unwrap()["client"].clone();
    fields.insert("client".to_string(), other_client);

    let err = protocol
        .read_client_body()
        .from_fields(fields)
        .verified()
        .unwrap_err();
    assert_eq!(err, ProtocolError::Protocol("signature mismatch".to_string()));
}

#[test]
fn test_other_site_signature_fails_verification() {
    let protocol = protocol();
    let identity = &identities()[0];
    let genuine = authenticate(&protocol, identity);
    let other_site = protocol
        .authenticate(&identity.master_key, "evil.example")
        .build_request(SIGNATURE_URI)
        .unwrap();

    let mut fields = split_key_value(genuine.encoded(), FIELD_SEPARATOR).unwrap();
    fields.insert("ids".to_string(), other_site.identity_signature().to_base64());

    assert!(protocol.read_client_body().from_fields(fields).verified().is_err());
}

#[test]
fn test_version_gate() {
    let protocol = protocol();
    let identity = &identities()[0];
    let body = protocol
        .authenticate(&identity.master_key, SITE_KEY)
        .version("2")
        .build_request(SIGNATURE_URI)
        .unwrap();

    let err = protocol
        .read_client_body()
        .from_body(body.encoded())
        .unwrap()
        .parse_unchecked()
        .unwrap_err();
    assert!(matches!(err, ProtocolError::Protocol(_)));
}

#[test]
fn test_server_body_with_unknown_field_roundtrips() {
    let protocol = protocol();
    let body = "server=dmVyPTENCm51dD1iWGtnYm5WMA0KdGlmPTENCnNmbj1NeSBzZXJ2ZXINCnFyeT0vbXkvcXVlcnk_cGFyYW09dmFsdWUmcGFyYW0yPXZhbHVlMg0K";

    let parsed = protocol
        .read_server_body()
        .from_body(body)
        .unwrap()
        .parsed()
        .unwrap();
    assert_eq!(parsed.encoded(), body);

    // The client echoes and signs the exact bytes it received
    let identity = &identities()[0];
    let response = protocol
        .answer_server(&identity.master_key, SITE_KEY, &parsed)
        .build_response_to(&parsed)
        .unwrap();
    let received = read_client(&protocol, &response);
    assert_eq!(received.server_parameter().encoded(), &body["server=".len()..]);
}
