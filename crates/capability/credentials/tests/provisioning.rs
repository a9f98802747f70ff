use bridge_credentials::{
    CERTIFICATE_FILE, CredentialProvisioner, PRIVATE_KEY_FILE, ProvisioningError, RSA_KEY_BITS,
    ensure_credentials,
};
use rsa::RsaPrivateKey;
use rsa::pkcs8::DecodePrivateKey;
use rsa::traits::PublicKeyParts;

const IDENTITY_URI: &str = "urn:example:opcua-bridge";

#[test]
fn creates_directory_and_both_files() {
    let root = tempfile::tempdir().expect("tempdir");
    let cert_dir = root.path().join("nested").join("certificates");

    let paths = ensure_credentials(&cert_dir, IDENTITY_URI).expect("provision");

    assert!(cert_dir.is_dir());
    assert!(paths.certificate_path.ends_with(CERTIFICATE_FILE));
    assert!(paths.private_key_path.ends_with(PRIVATE_KEY_FILE));
    assert!(paths.certificate_path.is_absolute());
    let pem = std::fs::read_to_string(&paths.private_key_path).expect("key");
    let key = RsaPrivateKey::from_pkcs8_pem(&pem).expect("written key is pkcs8 rsa");
    assert_eq!(key.size() * 8, RSA_KEY_BITS);
}

#[test]
fn second_call_reuses_existing_files() {
    let root = tempfile::tempdir().expect("tempdir");
    let provisioner = CredentialProvisioner::new(root.path());

    let first = provisioner.ensure_credentials(IDENTITY_URI).expect("first");
    let cert_before = std::fs::read(&first.certificate_path).expect("cert");
    let key_before = std::fs::read(&first.private_key_path).expect("key");

    let second = provisioner.ensure_credentials(IDENTITY_URI).expect("second");
    assert_eq!(first, second);
    assert_eq!(std::fs::read(&second.certificate_path).expect("cert"), cert_before);
    assert_eq!(std::fs::read(&second.private_key_path).expect("key"), key_before);
}

#[test]
fn regenerates_when_only_one_file_is_present() {
    let root = tempfile::tempdir().expect("tempdir");
    let first = ensure_credentials(root.path(), IDENTITY_URI).expect("first");
    let key_before = std::fs::read(&first.private_key_path).expect("key");
    std::fs::remove_file(&first.certificate_path).expect("remove cert");

    let second = ensure_credentials(root.path(), IDENTITY_URI).expect("second");
    assert!(second.certificate_path.is_file());
    assert_ne!(std::fs::read(&second.private_key_path).expect("key"), key_before);
}

#[test]
fn unwritable_location_is_a_provisioning_error() {
    let root = tempfile::tempdir().expect("tempdir");
    let blocker = root.path().join("blocker");
    std::fs::write(&blocker, b"not a directory").expect("write blocker");

    let err = ensure_credentials(blocker.join("certs"), IDENTITY_URI).expect_err("must fail");
    assert!(matches!(err, ProvisioningError::Io { .. }));
}
