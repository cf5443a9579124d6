//! # 宛先
//!
//! ディスパッチャが展開する宛先と、メールアドレスの整形・判定。
//!
//! - `emails` オーディエンス: アドレスを個別に整形し、GUID は持たない
//! - `users` / `spaces` / `orgs` / `everyone`: GUID のみを持ち、アドレスは
//!   配信時に ID プロバイダから解決する

/// 宛先
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Recipient {
    /// ユーザー GUID（メールアドレスは配信時に解決）
    User { guid: String },
    /// 生のメールアドレス（整形済み）
    Email { address: String },
}

impl Recipient {
    pub fn user(guid: impl Into<String>) -> Self {
        Self::User { guid: guid.into() }
    }

    /// 生のアドレスを整形して宛先にする
    pub fn email(raw: &str) -> Self {
        Self::Email {
            address: format_email(raw),
        }
    }

    /// レスポンスに載せる宛先表記
    pub fn label(&self) -> &str {
        match self {
            Self::User { guid } => guid,
            Self::Email { address } => address,
        }
    }
}

/// メールアドレスを整形する
///
/// 前後の空白を除去し、`表示名 <addr@example.com>` 形式であれば山括弧内の
/// アドレスだけを取り出す。妥当性は判定しない（配信時に
/// [`is_deliverable_address`] で判定し、不正なら配信不能にする）。
pub fn format_email(raw: &str) -> String {
    let trimmed = raw.trim();
    match (trimmed.rfind('<'), trimmed.rfind('>')) {
        (Some(start), Some(end)) if start < end => trimmed[start + 1..end].trim().to_string(),
        _ => trimmed.to_string(),
    }
}

/// 配信可能なアドレスかどうか
///
/// `@` を 1 つだけ含み、ローカル部・ドメイン部が空でなく、空白を含まないこと。
pub fn is_deliverable_address(address: &str) -> bool {
    let Some((local, domain)) = address.split_once('@') else {
        return false;
    };
    !local.is_empty()
        && !domain.is_empty()
        && !domain.contains('@')
        && !address.chars().any(char::is_whitespace)
}

/// 候補の中から最初の配信可能なアドレスを選ぶ
pub fn first_deliverable(addresses: &[String]) -> Option<&str> {
    addresses
        .iter()
        .map(String::as_str)
        .find(|address| is_deliverable_address(address))
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("  user@example.com  ", "user@example.com")]
    #[case("山田 <yamada@example.com>", "yamada@example.com")]
    #[case("<a@example.com>", "a@example.com")]
    #[case("no-at-sign", "no-at-sign")]
    fn format_emailは空白と表示名を取り除く(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(format_email(raw), expected);
    }

    #[rstest]
    #[case("user@example.com", true)]
    #[case("user", false)]
    #[case("@example.com", false)]
    #[case("user@", false)]
    #[case("a@b@c", false)]
    #[case("us er@example.com", false)]
    fn is_deliverable_addressの判定(#[case] address: &str, #[case] expected: bool) {
        assert_eq!(is_deliverable_address(address), expected);
    }

    #[test]
    fn first_deliverableは最初の有効なアドレスを返す() {
        let addresses = vec![
            "invalid".to_string(),
            "first@example.com".to_string(),
            "second@example.com".to_string(),
        ];

        assert_eq!(first_deliverable(&addresses), Some("first@example.com"));
        assert_eq!(first_deliverable(&["nope".to_string()]), None);
    }

    #[test]
    fn 宛先のlabelはguidまたはアドレスを返す() {
        assert_eq!(Recipient::user("user-1").label(), "user-1");
        assert_eq!(Recipient::email(" a@example.com ").label(), "a@example.com");
    }
}
