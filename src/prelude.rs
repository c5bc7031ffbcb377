macro_rules! constrained_f64 {
    ( $name:ident, $closure:tt, $msg:expr, $closure2:tt, $msg2:expr) => {
        #[derive(Debug, Copy, Clone, PartialEq)]
        pub struct $name(f64);

        impl $name {
            pub fn new(x: f64) -> Self {
                assert!(($closure)(x), $msg);
                Self(x)
            }

            pub fn try_new(x: f64) -> Option<Self> {
                if ($closure)(x) {
                    Some(Self(x))
                } else {
                    None
                }
            }

            pub fn new_with_variable_constraint(x: f64, y: f64) -> Self {
                assert!(($closure2)(x, y), $msg2);
                Self(x)
            }

            pub fn try_new_with_variable_constraint(x: f64, y: f64) -> Option<Self> {
                if ($closure2)(x, y) {
                    Some(Self(x))
                } else {
                    None
                }
            }

            pub fn get(self) -> f64 {
                self.0
            }

            pub fn ln(self) -> f64 {
                self.0.ln()
            }
        }
    };
}

constrained_f64!(
    Strength,
    (|x| x > 0.0),
    "Strength must be greater than zero.",
    (|x, y: f64| x > -y),
    "Strength must be greater than the negative of the discount."
);

constrained_f64!(
    Discount,
    (|x| (0.0..1.0).contains(&x)),
    "Discount must be in [0,1).",
    (|_x, _y| false),
    "Not supported."
);

constrained_f64!(
    Shape,
    (|x| x > 0.0),
    "Shape must be greater than zero.",
    (|_x, _y| false),
    "Not supported."
);

constrained_f64!(
    Rate,
    (|x| x > 0.0),
    "Rate must be greater than zero.",
    (|_x, _y| false),
    "Not supported."
);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strength_accepts_negative_above_discount() {
        let discount = Discount::new(0.5);
        let strength = Strength::new_with_variable_constraint(-0.25, discount.get());
        assert_eq!(strength.get(), -0.25);
        assert!(Strength::try_new_with_variable_constraint(-0.5, 0.5).is_none());
        assert!(Strength::try_new(0.0).is_none());
    }

    #[test]
    #[should_panic]
    fn test_discount_of_one_is_rejected() {
        Discount::new(1.0);
    }

    #[test]
    fn test_shape() {
        assert!(Shape::try_new(1.0).is_some());
        assert!(Shape::try_new(-1.0).is_none());
        assert_eq!(Shape::new(2.0).ln(), 2.0_f64.ln());
    }
}
