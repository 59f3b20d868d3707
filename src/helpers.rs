//! CPF and phone number handling.

/// Strip everything but ASCII digits.
pub fn digits(raw: &str) -> String {
    raw.chars().filter(|c| c.is_ascii_digit()).collect()
}

/// Check digit over `digits` with weights counting down from `first_weight`.
fn cpf_check_digit(digits: &[u32], first_weight: u32) -> u32 {
    let sum: u32 = digits
        .iter()
        .zip((2..=first_weight).rev())
        .map(|(d, w)| d * w)
        .sum();
    let remainder = (sum * 10) % 11;
    if remainder == 10 { 0 } else { remainder }
}

/// Validate a CPF, formatted or not. Eleven identical digits are always rejected.
pub fn validate_cpf(raw: &str) -> bool {
    let nums: Vec<u32> = digits(raw).chars().filter_map(|c| c.to_digit(10)).collect();
    if nums.len() != 11 {
        return false;
    }
    if nums.iter().all(|&d| d == nums[0]) {
        return false;
    }
    cpf_check_digit(&nums[..9], 10) == nums[9] && cpf_check_digit(&nums[..10], 11) == nums[10]
}

/// Format eleven digits as `XXX.XXX.XXX-XX`. Anything else is returned as digits only.
pub fn format_cpf(raw: &str) -> String {
    let d = digits(raw);
    if d.len() != 11 {
        return d;
    }
    format!("{}.{}.{}-{}", &d[0..3], &d[3..6], &d[6..9], &d[9..11])
}

/// `validator` hook for request bodies.
pub fn validate_cpf_field(value: &str) -> Result<(), validator::ValidationError> {
    if validate_cpf(value) {
        Ok(())
    } else {
        Err(validator::ValidationError::new("cpf").with_message("invalid CPF".into()))
    }
}

/// Format Brazilian phone numbers: `(XX) XXXXX-XXXX` for mobiles, `(XX) XXXX-XXXX`
/// for landlines. Other lengths are returned as digits only.
pub fn format_phone(raw: &str) -> String {
    let d = digits(raw);
    match d.len() {
        11 => format!("({}) {}-{}", &d[0..2], &d[2..7], &d[7..11]),
        10 => format!("({}) {}-{}", &d[0..2], &d[2..6], &d[6..10]),
        _  => d,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn with_check_digits(base: &str) -> String {
        let nums: Vec<u32> = base.chars().filter_map(|c| c.to_digit(10)).collect();
        let first = cpf_check_digit(&nums, 10);
        let mut ten = nums.clone();
        ten.push(first);
        let second = cpf_check_digit(&ten, 11);
        format!("{base}{first}{second}")
    }

    #[test]
    fn accepts_known_valid_cpfs() {
        assert!(validate_cpf("529.982.247-25"));
        assert!(validate_cpf("52998224725"));
        assert!(validate_cpf("111.444.777-35"));
    }

    #[test]
    fn rejects_wrong_check_digits() {
        assert!(!validate_cpf("529.982.247-26"));
        assert!(!validate_cpf("111.444.777-53"));
    }

    #[test]
    fn rejects_repeated_digits() {
        for d in 0..=9 {
            let cpf = d.to_string().repeat(11);
            assert!(!validate_cpf(&cpf), "{cpf} must be rejected");
        }
    }

    #[test]
    fn rejects_wrong_length() {
        assert!(!validate_cpf(""));
        assert!(!validate_cpf("5299822472"));
        assert!(!validate_cpf("529982247250"));
    }

    #[test]
    fn accepted_cpfs_match_recomputed_check_digits() {
        for base in ["123456789", "987654321", "000000001", "314159265", "271828182"] {
            let cpf = with_check_digits(base);
            assert!(validate_cpf(&cpf), "{cpf} should validate");
            let nums: Vec<u32> = cpf.chars().filter_map(|c| c.to_digit(10)).collect();
            assert_eq!(cpf_check_digit(&nums[..9], 10), nums[9]);
            assert_eq!(cpf_check_digit(&nums[..10], 11), nums[10]);
        }
    }

    #[test]
    fn formats_cpf() {
        assert_eq!(format_cpf("52998224725"), "529.982.247-25");
        assert_eq!(format_cpf("529.982.247-25"), "529.982.247-25");
        assert_eq!(format_cpf("123"), "123");
    }

    #[test]
    fn formats_phone() {
        assert_eq!(format_phone("11987654321"), "(11) 98765-4321");
        assert_eq!(format_phone("(11) 3456-7890"), "(11) 3456-7890");
        assert_eq!(format_phone("+1 555"), "1555");
    }
}
