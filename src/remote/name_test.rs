use crate::remote::encode_to_remote_name;

fn suffix_is_short_sha1(name: &str, prefix: &str) -> bool {
    let rest = name.strip_prefix(prefix).unwrap();
    rest.len() == 7 && rest.chars().all(|c| c.is_ascii_hexdigit())
}

#[test]
fn test_host_labels_for_url_shapes() {
    let name = encode_to_remote_name("ssh://user@github.com:443/foo-bar/baz.git").unwrap();
    assert!(name.starts_with("github_com_"), "{name}");
    assert!(suffix_is_short_sha1(&name, "github_com_"));

    let name = encode_to_remote_name("https://github.com/foo-bar/baz.git").unwrap();
    assert!(name.starts_with("github_com_"), "{name}");
    assert!(suffix_is_short_sha1(&name, "github_com_"));

    let name = encode_to_remote_name("ssh://user@127.0.0.1:443/foo-bar/baz.git").unwrap();
    assert!(name.starts_with("127_0_0_1_"), "{name}");
    assert!(suffix_is_short_sha1(&name, "127_0_0_1_"));

    let name = encode_to_remote_name("git@github.com:foo-bar/baz.git").unwrap();
    assert!(name.starts_with("github_com_"), "{name}");
    assert!(suffix_is_short_sha1(&name, "github_com_"));
}

#[test]
fn test_same_url_same_name() {
    let url = "https://github.com/foo-bar/baz.git";
    assert_eq!(
        encode_to_remote_name(url).unwrap(),
        encode_to_remote_name(url).unwrap()
    );
}

#[test]
fn test_different_urls_different_names() {
    let a = encode_to_remote_name("https://github.com/foo-bar/baz.git").unwrap();
    let b = encode_to_remote_name("https://github.com/foo-bar/qux.git").unwrap();
    assert_ne!(a, b);
}

#[test]
fn test_hostless_urls_use_the_local_pseudo_host() {
    let name = encode_to_remote_name("/var/data/remote.git").unwrap();
    assert!(name.starts_with("local_"), "{name}");
    assert!(suffix_is_short_sha1(&name, "local_"));

    assert!(encode_to_remote_name("").is_err());
}
