// Formula parser - converts formula strings into AST
// Supports: numbers, strings, booleans, cell refs (A1, $A$1, Sheet2!A1), ranges (A1:B5),
// function calls (`,` or `;` separated), + - * / ^ & %, comparison operators.

/// Expression AST. Sheet qualifiers stay as names and are resolved by the
/// `CellLookup` at evaluation time.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Text(String),
    Boolean(bool),
    CellRef {
        sheet: Option<String>,
        row: usize,
        col: usize,
    },
    Range {
        sheet: Option<String>,
        start_row: usize,
        start_col: usize,
        end_row: usize,
        end_col: usize,
    },
    Function {
        name: String,
        args: Vec<Expr>,
    },
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Bare identifier that is not a function call (named ranges are not supported)
    Name(String),
    /// Empty/omitted argument (e.g. the trailing slot in `=IF(a,b,)`)
    Empty,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Op {
    // Arithmetic
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    // Comparison
    Lt,
    Gt,
    Eq,
    LtEq,
    GtEq,
    NotEq,
    // String
    Concat,
}

/// Parse a formula string (leading `=` required) into an AST.
pub fn parse(formula: &str) -> Result<Expr, String> {
    let formula = formula.trim();
    let input = formula
        .strip_prefix('=')
        .ok_or_else(|| "Formula must start with =".to_string())?;

    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err("Empty formula".to_string());
    }
    let (expr, pos) = parse_comparison(&tokens, 0)?;
    if pos != tokens.len() {
        return Err(format!("Unexpected token at position {}", pos));
    }
    Ok(expr)
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    StringLit(String),
    CellRef { col: usize, row: usize },
    /// Sheet name prefix (e.g., "Sheet1" from "Sheet1!A1")
    SheetPrefix(String),
    Ident(String),
    Plus,
    Minus,
    Star,
    Slash,
    LParen,
    RParen,
    Colon,
    /// Argument separator: `,` or `;`
    Comma,
    Lt,
    Gt,
    Eq,
    LtEq,
    GtEq,
    NotEq,
    Ampersand,
    Caret,
    Percent,
}

/// Tokens that are always exactly one character.
fn single_char_token(c: char) -> Option<Token> {
    Some(match c {
        '+' => Token::Plus,
        '-' => Token::Minus,
        '*' => Token::Star,
        '/' => Token::Slash,
        '(' => Token::LParen,
        ')' => Token::RParen,
        ':' => Token::Colon,
        ',' | ';' => Token::Comma,
        '&' => Token::Ampersand,
        '^' => Token::Caret,
        '%' => Token::Percent,
        '=' => Token::Eq,
        _ => return None,
    })
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        if let Some(token) = single_char_token(c) {
            tokens.push(token);
            chars.next();
            continue;
        }
        match c {
            c if c.is_whitespace() => { chars.next(); }
            '<' => {
                chars.next();
                match chars.peek() {
                    Some('=') => { tokens.push(Token::LtEq); chars.next(); }
                    Some('>') => { tokens.push(Token::NotEq); chars.next(); }
                    _ => tokens.push(Token::Lt),
                }
            }
            '>' => {
                chars.next();
                if let Some('=') = chars.peek() {
                    tokens.push(Token::GtEq);
                    chars.next();
                } else {
                    tokens.push(Token::Gt);
                }
            }
            '"' => {
                // String literal, "" inside is an escaped quote
                chars.next();
                let mut s = String::new();
                loop {
                    match chars.next() {
                        Some('"') => {
                            if chars.peek() == Some(&'"') {
                                chars.next();
                                s.push('"');
                            } else {
                                break;
                            }
                        }
                        Some(ch) => s.push(ch),
                        None => return Err("Unterminated string literal".to_string()),
                    }
                }
                tokens.push(Token::StringLit(s));
            }
            '\'' => {
                // Quoted sheet name ('My Sheet'!A1, 'Bob''s Sheet'!A1)
                chars.next();
                let mut sheet_name = String::new();
                loop {
                    match chars.next() {
                        Some('\'') => {
                            if chars.peek() == Some(&'\'') {
                                chars.next();
                                sheet_name.push('\'');
                            } else {
                                break;
                            }
                        }
                        Some(ch) => sheet_name.push(ch),
                        None => return Err("Unterminated sheet name".to_string()),
                    }
                }
                if chars.next() != Some('!') {
                    return Err("Quoted sheet name must be followed by !".to_string());
                }
                tokens.push(Token::SheetPrefix(sheet_name));
            }
            'A'..='Z' | 'a'..='z' | '_' | '$' => {
                // Cell reference (A1, $A$1), function name (SUM, STDEV.P) or sheet prefix (Sheet1!)
                let mut ident = String::new();
                while let Some(&ch) = chars.peek() {
                    if ch.is_ascii_alphanumeric() || ch == '_' || ch == '$' || ch == '.' {
                        ident.push(ch);
                        chars.next();
                    } else {
                        break;
                    }
                }

                if chars.peek() == Some(&'!') {
                    chars.next();
                    tokens.push(Token::SheetPrefix(ident));
                    continue;
                }

                // LOG10( is a call, not a cell reference
                let is_call = chars.peek() == Some(&'(');
                if let Some(token) = try_parse_cell_ref(&ident).filter(|_| !is_call) {
                    tokens.push(token);
                } else if ident.contains('$') {
                    return Err(format!("Invalid cell reference: {}", ident));
                } else {
                    tokens.push(Token::Ident(ident.to_uppercase()));
                }
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else if (d == 'e' || d == 'E') && !num_str.contains(['e', 'E']) {
                        // Exponent only when followed by a digit or sign
                        let mut lookahead = chars.clone();
                        lookahead.next();
                        match lookahead.peek() {
                            Some(n) if n.is_ascii_digit() || *n == '+' || *n == '-' => {
                                num_str.push(d);
                                chars.next();
                                if let Some(&sign) = chars.peek() {
                                    if sign == '+' || sign == '-' {
                                        num_str.push(sign);
                                        chars.next();
                                    }
                                }
                            }
                            _ => break,
                        }
                    } else {
                        break;
                    }
                }
                let num: f64 = num_str.parse().map_err(|_| format!("Invalid number: {}", num_str))?;
                tokens.push(Token::Number(num));
            }
            _ => return Err(format!("Unexpected character: {}", c)),
        }
    }

    Ok(tokens)
}

fn try_parse_cell_ref(s: &str) -> Option<Token> {
    let (row, col) = crate::cell_id::parse_a1(s)?;
    // parse_a1 strips every '$'; only accept them at the two legal spots
    let stripped = s.strip_prefix('$').unwrap_or(s);
    if stripped.contains("$$") || stripped.chars().filter(|c| *c == '$').count() > 1 {
        return None;
    }
    Some(Token::CellRef { col, row })
}

type Level = fn(&[Token], usize) -> Result<(Expr, usize), String>;

/// One left-associative precedence level: `next (op next)*`.
fn left_assoc(
    tokens: &[Token],
    pos: usize,
    next: Level,
    op_of: fn(&Token) -> Option<Op>,
) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = next(tokens, pos)?;
    while let Some(op) = tokens.get(pos).and_then(op_of) {
        let (right, new_pos) = next(tokens, pos + 1)?;
        left = binary(op, left, right);
        pos = new_pos;
    }
    Ok((left, pos))
}

// Lowest precedence: comparison operators
fn parse_comparison(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    left_assoc(tokens, pos, parse_concat, |t| match t {
        Token::Lt => Some(Op::Lt),
        Token::Gt => Some(Op::Gt),
        Token::Eq => Some(Op::Eq),
        Token::LtEq => Some(Op::LtEq),
        Token::GtEq => Some(Op::GtEq),
        Token::NotEq => Some(Op::NotEq),
        _ => None,
    })
}

fn parse_concat(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    left_assoc(tokens, pos, parse_add_sub, |t| (*t == Token::Ampersand).then_some(Op::Concat))
}

fn parse_add_sub(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    left_assoc(tokens, pos, parse_mul_div, |t| match t {
        Token::Plus => Some(Op::Add),
        Token::Minus => Some(Op::Sub),
        _ => None,
    })
}

fn parse_mul_div(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    left_assoc(tokens, pos, parse_power, |t| match t {
        Token::Star => Some(Op::Mul),
        Token::Slash => Some(Op::Div),
        _ => None,
    })
}

// Exponentiation (^) - right-associative, higher precedence than * /
fn parse_power(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (base, pos) = parse_percent(tokens, pos)?;

    if pos < tokens.len() && tokens[pos] == Token::Caret {
        let (exponent, new_pos) = parse_power(tokens, pos + 1)?;
        return Ok((binary(Op::Pow, base, exponent), new_pos));
    }

    Ok((base, pos))
}

// Percent postfix (%) desugars to * 0.01
fn parse_percent(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let (mut expr, mut pos) = parse_primary(tokens, pos)?;

    while pos < tokens.len() && tokens[pos] == Token::Percent {
        expr = binary(Op::Mul, expr, Expr::Number(0.01));
        pos += 1;
    }

    Ok((expr, pos))
}

fn parse_primary(tokens: &[Token], pos: usize) -> Result<(Expr, usize), String> {
    let Some(token) = tokens.get(pos) else {
        return Err("Unexpected end of expression".to_string());
    };

    match token {
        Token::Number(n) => Ok((Expr::Number(*n), pos + 1)),
        Token::StringLit(s) => Ok((Expr::Text(s.clone()), pos + 1)),
        Token::SheetPrefix(sheet_name) => match tokens.get(pos + 1) {
            Some(Token::CellRef { .. }) => parse_reference(tokens, pos + 1, Some(sheet_name.clone())),
            _ => Err("Sheet reference must be followed by cell reference".to_string()),
        },
        Token::CellRef { .. } => parse_reference(tokens, pos, None),
        Token::Ident(name) => {
            if name == "TRUE" || name == "FALSE" {
                // TRUE() / FALSE() are also accepted as calls
                let next = if tokens.get(pos + 1) == Some(&Token::LParen)
                    && tokens.get(pos + 2) == Some(&Token::RParen)
                {
                    pos + 3
                } else {
                    pos + 1
                };
                return Ok((Expr::Boolean(name == "TRUE"), next));
            }
            if tokens.get(pos + 1) == Some(&Token::LParen) {
                let (args, new_pos) = parse_function_args(tokens, pos + 2)?;
                return Ok((Expr::Function { name: name.clone(), args }, new_pos));
            }
            Ok((Expr::Name(name.clone()), pos + 1))
        }
        Token::LParen => {
            let (expr, pos) = parse_comparison(tokens, pos + 1)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((expr, pos + 1)),
                Some(_) => Err("Expected closing parenthesis".to_string()),
                None => Err("Missing closing parenthesis".to_string()),
            }
        }
        // Unary plus is a no-op
        Token::Plus => parse_percent(tokens, pos + 1),
        Token::Minus => {
            let (expr, pos) = parse_percent(tokens, pos + 1)?;
            Ok((binary(Op::Sub, Expr::Number(0.0), expr), pos))
        }
        _ => Err(format!("Unexpected token at position {}", pos)),
    }
}

/// Cell reference at `pos`, extended to a range when followed by `:ref`.
fn parse_reference(tokens: &[Token], pos: usize, sheet: Option<String>) -> Result<(Expr, usize), String> {
    let Some(Token::CellRef { col, row }) = tokens.get(pos) else {
        return Err("Expected cell reference".to_string());
    };
    if tokens.get(pos + 1) == Some(&Token::Colon) {
        if let Some(Token::CellRef { col: end_col, row: end_row }) = tokens.get(pos + 2) {
            return Ok((
                Expr::Range {
                    sheet,
                    start_row: (*row).min(*end_row),
                    start_col: (*col).min(*end_col),
                    end_row: (*row).max(*end_row),
                    end_col: (*col).max(*end_col),
                },
                pos + 3,
            ));
        }
        return Err("Range must end with a cell reference".to_string());
    }
    Ok((Expr::CellRef { sheet, row: *row, col: *col }, pos + 1))
}

fn parse_function_args(tokens: &[Token], pos: usize) -> Result<(Vec<Expr>, usize), String> {
    let mut args = Vec::new();
    let mut pos = pos;

    // SUM()
    if tokens.get(pos) == Some(&Token::RParen) {
        return Ok((args, pos + 1));
    }

    loop {
        // Empty argument: next token is , or ) immediately
        match tokens.get(pos) {
            Some(Token::Comma) => {
                args.push(Expr::Empty);
                pos += 1;
                continue;
            }
            Some(Token::RParen) => {
                args.push(Expr::Empty);
                return Ok((args, pos + 1));
            }
            _ => {}
        }

        let (arg, new_pos) = parse_comparison(tokens, pos)?;
        args.push(arg);
        pos = new_pos;

        match tokens.get(pos) {
            Some(Token::RParen) => return Ok((args, pos + 1)),
            Some(Token::Comma) => pos += 1,
            Some(_) => return Err("Expected comma or closing parenthesis".to_string()),
            None => return Err("Missing closing parenthesis in function call".to_string()),
        }
    }
}

fn binary(op: Op, left: Expr, right: Expr) -> Expr {
    Expr::BinaryOp {
        op,
        left: Box::new(left),
        right: Box::new(right),
    }
}
