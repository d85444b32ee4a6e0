/// Implements the standard arithmetic operator traits for single-field newtypes.
///
/// ```nocompile
/// op!(binary MinorUnits, Add, add);
/// op!(inplace MinorUnits, AddAssign, add_assign);
/// op!(unary MinorUnits, Neg, neg);
/// ```
#[macro_export]
macro_rules! op {
    (binary $t:ty, $imp:ident, $method:ident) => {
        impl $imp for $t {
            type Output = Self;

            fn $method(self, rhs: Self) -> Self::Output {
                Self(self.0.$method(rhs.0))
            }
        }
    };
    (inplace $t:ty, $imp:ident, $method:ident) => {
        impl $imp for $t {
            fn $method(&mut self, rhs: Self) {
                self.0.$method(rhs.0)
            }
        }
    };
    (unary $t:ty, $imp:ident, $method:ident) => {
        impl $imp for $t {
            type Output = Self;

            fn $method(self) -> Self::Output {
                Self(self.0.$method())
            }
        }
    };
}
